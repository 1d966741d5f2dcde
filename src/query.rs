//! The query-result table (C5, §3, §4.5): a process-wide table of active
//! results, each a SELECT (server list-file + cursor) or a CALL (single
//! materialised value with a three-state cursor). Entries grow by a fixed
//! initial capacity then ×1.25 on overflow, and carry a back-index so
//! they can self-unlink on free.

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::value::DbValue;

const INITIAL_CAPACITY: usize = 10;
const GROWTH_FACTOR: f64 = 1.25;

/// Opaque handle into the query-result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultHandle(pub usize);

/// Three-state cursor over a CALL result's single materialised value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPosition {
    Before,
    On,
    After,
}

/// One live entry in the table.
#[derive(Debug, Clone)]
pub enum ResultSlot {
    Select {
        query_id: u64,
        cursor: Cursor,
        holdable: bool,
        server_query_ended: bool,
    },
    Call {
        value: DbValue,
        position: CallPosition,
    },
}

struct Entry {
    slot: ResultSlot,
    back_index: usize,
}

/// The table itself (§3 "Query result table"). Invariant: for every live
/// entry `r`, `table[r.back_index] == r` — enforced here by storing
/// `back_index` equal to the slot's own index, since this table is a
/// `Vec<Option<Entry>>` rather than a pointer-chasing arena.
pub struct ResultTable {
    slots: Vec<Option<Entry>>,
    free_list: Vec<usize>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self {
            slots: (0..INITIAL_CAPACITY).map(|_| None).collect(),
            free_list: (0..INITIAL_CAPACITY).rev().collect(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn grow(&mut self) {
        let old_len = self.slots.len();
        let new_len = ((old_len as f64) * GROWTH_FACTOR).ceil() as usize;
        let new_len = new_len.max(old_len + 1);
        for i in old_len..new_len {
            self.slots.push(None);
            self.free_list.push(i);
        }
    }

    pub fn insert(&mut self, slot: ResultSlot) -> ResultHandle {
        if self.free_list.is_empty() {
            self.grow();
        }
        let index = self.free_list.pop().expect("grow() guarantees a free slot");
        self.slots[index] = Some(Entry { slot, back_index: index });
        ResultHandle(index)
    }

    pub fn get(&self, handle: ResultHandle) -> Result<&ResultSlot> {
        self.slots
            .get(handle.0)
            .and_then(|e| e.as_ref())
            .map(|e| {
                debug_assert_eq!(e.back_index, handle.0);
                &e.slot
            })
            .ok_or(Error::OprOnClosedQres)
    }

    pub fn get_mut(&mut self, handle: ResultHandle) -> Result<&mut ResultSlot> {
        self.slots
            .get_mut(handle.0)
            .and_then(|e| e.as_mut())
            .map(|e| &mut e.slot)
            .ok_or(Error::OprOnClosedQres)
    }

    /// Free an entry explicitly, self-unlinking via its back-index.
    pub fn free(&mut self, handle: ResultHandle) {
        if let Some(entry) = self.slots[handle.0].take() {
            debug_assert_eq!(entry.back_index, handle.0);
            self.free_list.push(handle.0);
        }
    }

    /// Remove and return the query ids of every live SELECT result that
    /// should end at a transaction boundary (§4.5
    /// `db_clear_client_query_result`): non-holdable results always end;
    /// holdable ones only end when `end_holdable` is set. CALL results
    /// are left untouched — they carry no server-side state to release.
    pub fn take_query_ids_to_end(&mut self, end_holdable: bool) -> Vec<(ResultHandle, u64)> {
        let mut out = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = slot {
                if let ResultSlot::Select {
                    query_id,
                    holdable,
                    server_query_ended,
                    ..
                } = &entry.slot
                {
                    if (!*holdable || end_holdable) && !*server_query_ended {
                        out.push((ResultHandle(index), *query_id));
                    }
                }
            }
        }
        out
    }

    /// Mark a SELECT entry's server state as ended and free the slot
    /// (mirrors `end_query_internal` closing the cursor then freeing).
    pub fn close_and_free(&mut self, handle: ResultHandle) {
        self.free(handle);
    }
}

impl Default for ResultTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------
// Query lifecycle (§4.5): prepare, execute, end, cursor operations.
// ---------------------------------------------------------------------

use bytes::Bytes;

use crate::connection::Connection;
use crate::cursor::{NavOutcome, SeekMode, TuplePos};
use crate::protocol::buffer::PackedWriter;
use crate::protocol::codec::{pack_oid, pack_value, unpack_value, XaslId};
use crate::protocol::constants::{Opcode, QUERY_END};
use crate::value::Oid;

/// A compiled plan handle plus any node header the server sent back.
#[derive(Debug, Clone, Default)]
pub struct PreparedPlan {
    pub xasl_id: XaslId,
    pub node_header: Vec<u8>,
}

/// Status flag returned alongside `qmgr_execute_query`'s result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteStatus {
    Ok,
    Error,
}

impl Connection {
    /// Prepare a query from its hash text, plan text and a compiled XASL
    /// stream, returning the cached plan handle (§4.5 "Prepare").
    pub async fn qmgr_prepare_query(&mut self, sql_hash_text: &str, plan_text: &str, user_oid: Oid, xasl_stream: &[u8]) -> Result<PreparedPlan> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(sql_hash_text);
        w.write_string_prefixed(plan_text);
        pack_oid(&mut w, &user_oid);
        w.write_i32(xasl_stream.len() as i32);
        let header: Bytes = w.freeze();
        let stream: Bytes = Bytes::copy_from_slice(xasl_stream);

        let mut r = self
            .dispatcher
            .dispatch(Opcode::QmgrPrepareQuery, &[header, stream])
            .await?;
        let xasl_id = crate::protocol::codec::unpack_xasl_id(&mut r)?;
        let header_present = r.read_u8()? != 0;
        r.align8()?;
        let node_header = if header_present {
            let len = r.read_i32()? as usize;
            r.read_bytes(len)?.to_vec()
        } else {
            Vec::new()
        };
        Ok(PreparedPlan { xasl_id, node_header })
    }

    /// Execute a prepared plan with the given bind values, opening a new
    /// SELECT result whose first list-file page arrives in this same
    /// reply (§4.5 "Execute", §5 ordering guarantee).
    pub async fn qmgr_execute_query(
        &mut self,
        xasl_id: XaslId,
        bind_values: &[DbValue],
        holdable: bool,
    ) -> Result<(ResultHandle, ExecuteStatus)> {
        let mut w = PackedWriter::new();
        crate::protocol::codec::pack_xasl_id(&mut w, &xasl_id);
        w.write_i32(bind_values.len() as i32);
        for v in bind_values {
            pack_value(&mut w, v);
        }
        w.write_u8(holdable as u8);
        w.align8();
        let req: Bytes = w.freeze();

        let mut r = self.dispatcher.dispatch(Opcode::QmgrExecuteQuery, &[req]).await?;
        let server_request_kind = r.read_u32()?;
        if server_request_kind != QUERY_END {
            return Err(Error::protocol("qmgr_execute_query: unexpected server request kind"));
        }
        let query_id = r.read_u64()?;
        let status_flag = r.read_u8()?;
        r.align8()?;
        let tuple_count = r.read_i32()? as usize;
        let column_count = r.read_i32()? as usize;
        let mut tuples = Vec::with_capacity(tuple_count);
        for _ in 0..tuple_count {
            let mut row = Vec::with_capacity(column_count);
            for _ in 0..column_count {
                row.push(unpack_value(&mut r)?);
            }
            tuples.push(row);
        }

        let handle = self.results.insert(ResultSlot::Select {
            query_id,
            cursor: Cursor::new(tuples),
            holdable,
            server_query_ended: false,
        });
        let status = if status_flag == 0 { ExecuteStatus::Ok } else { ExecuteStatus::Error };
        Ok((handle, status))
    }

    /// Release server-side state for a SELECT result and free its slot.
    pub async fn qmgr_end_query(&mut self, handle: ResultHandle) -> Result<()> {
        let query_id = match self.results.get(handle)? {
            ResultSlot::Select {
                query_id,
                server_query_ended,
                ..
            } => {
                if *server_query_ended {
                    None
                } else {
                    Some(*query_id)
                }
            }
            ResultSlot::Call { .. } => None,
        };
        if let Some(query_id) = query_id {
            let mut w = PackedWriter::new();
            w.write_u64(query_id);
            self.dispatcher.dispatch(Opcode::QmgrEndQuery, &[w.freeze()]).await?;
        }
        self.results.close_and_free(handle);
        Ok(())
    }

    pub async fn qmgr_drop_query_plan(&mut self, sql_hash_text: &str, user_oid: Oid, xasl_id: XaslId) -> Result<()> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(sql_hash_text);
        pack_oid(&mut w, &user_oid);
        crate::protocol::codec::pack_xasl_id(&mut w, &xasl_id);
        self.dispatcher
            .dispatch(Opcode::QmgrDropQueryPlan, &[w.freeze()])
            .await?;
        Ok(())
    }

    pub async fn qmgr_drop_all_query_plans(&mut self) -> Result<()> {
        self.dispatcher.dispatch(Opcode::QmgrDropAllQueryPlans, &[]).await?;
        Ok(())
    }

    // -- Cursor operations, dispatched by result shape (§4.5) --

    fn cursor_mut(&mut self, handle: ResultHandle) -> Result<&mut Cursor> {
        match self.results.get_mut(handle)? {
            ResultSlot::Select { cursor, .. } => Ok(cursor),
            ResultSlot::Call { .. } => Err(Error::InvalidRestype),
        }
    }

    pub fn next_tuple(&mut self, handle: ResultHandle) -> Result<NavOutcome> {
        match self.results.get_mut(handle)? {
            ResultSlot::Select { cursor, .. } => Ok(cursor.next_tuple()),
            ResultSlot::Call { position, .. } => {
                *position = match position {
                    CallPosition::Before => CallPosition::On,
                    CallPosition::On => CallPosition::After,
                    CallPosition::After => CallPosition::After,
                };
                Ok(if *position == CallPosition::After {
                    NavOutcome::End
                } else {
                    NavOutcome::Ok
                })
            }
        }
    }

    pub fn prev_tuple(&mut self, handle: ResultHandle) -> Result<NavOutcome> {
        match self.results.get_mut(handle)? {
            ResultSlot::Select { cursor, .. } => Ok(cursor.prev_tuple()),
            ResultSlot::Call { position, .. } => {
                *position = match position {
                    CallPosition::After => CallPosition::On,
                    CallPosition::On => CallPosition::Before,
                    CallPosition::Before => CallPosition::Before,
                };
                Ok(if *position == CallPosition::Before {
                    NavOutcome::End
                } else {
                    NavOutcome::Ok
                })
            }
        }
    }

    pub fn first_tuple(&mut self, handle: ResultHandle) -> Result<NavOutcome> {
        Ok(self.cursor_mut(handle)?.first_tuple())
    }

    pub fn last_tuple(&mut self, handle: ResultHandle) -> Result<NavOutcome> {
        Ok(self.cursor_mut(handle)?.last_tuple())
    }

    pub fn seek_tuple(&mut self, handle: ResultHandle, offset: i64, mode: SeekMode) -> Result<NavOutcome> {
        self.cursor_mut(handle)?.seek_tuple(offset, mode)
    }

    pub fn get_tuple_value(&self, handle: ResultHandle, index: usize) -> Result<DbValue> {
        match self.results.get(handle)? {
            ResultSlot::Select { cursor, .. } => cursor.get_tuple_value(index).cloned(),
            ResultSlot::Call { value, position } => {
                if *position != CallPosition::On {
                    return Err(Error::OprOnClosedQres);
                }
                if index != 0 {
                    return Err(Error::InvalidTplvalIndex { index, count: 1 });
                }
                Ok(value.clone())
            }
        }
    }

    pub fn get_tuple_value_list(&self, handle: ResultHandle) -> Result<Vec<DbValue>> {
        match self.results.get(handle)? {
            ResultSlot::Select { cursor, .. } => cursor.get_tuple_value_list().map(|s| s.to_vec()),
            ResultSlot::Call { value, position } => {
                if *position != CallPosition::On {
                    return Err(Error::OprOnClosedQres);
                }
                Ok(vec![value.clone()])
            }
        }
    }

    pub fn tuple_count(&self, handle: ResultHandle) -> Result<usize> {
        match self.results.get(handle)? {
            ResultSlot::Select { cursor, .. } => Ok(cursor.tuple_count()),
            ResultSlot::Call { .. } => Ok(1),
        }
    }

    pub fn column_count(&self, handle: ResultHandle) -> Result<usize> {
        match self.results.get(handle)? {
            ResultSlot::Select { cursor, .. } => Ok(cursor.column_count()),
            ResultSlot::Call { .. } => Ok(1),
        }
    }

    pub fn get_tplpos(&self, handle: ResultHandle) -> Result<TuplePos> {
        match self.results.get(handle)? {
            ResultSlot::Select { cursor, .. } => Ok(cursor.get_tplpos()),
            ResultSlot::Call { .. } => Err(Error::InvalidRestype),
        }
    }

    pub fn set_tplpos(&mut self, handle: ResultHandle, pos: TuplePos) -> Result<()> {
        self.cursor_mut(handle)?.set_tplpos(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_slot(v: i32) -> ResultSlot {
        ResultSlot::Call {
            value: DbValue::Integer(v),
            position: CallPosition::Before,
        }
    }

    #[test]
    fn table_grows_past_initial_capacity() {
        let mut table = ResultTable::new();
        let mut handles = Vec::new();
        for i in 0..15 {
            handles.push(table.insert(call_slot(i)));
        }
        assert_eq!(table.active_count(), 15);
        assert!(table.get(handles[14]).is_ok());
    }

    #[test]
    fn free_then_closed_access_errors() {
        let mut table = ResultTable::new();
        let h = table.insert(call_slot(1));
        table.free(h);
        assert!(matches!(table.get(h), Err(Error::OprOnClosedQres)));
    }

    #[test]
    fn take_query_ids_to_end_respects_holdable_flag() {
        let mut table = ResultTable::new();
        let holdable = table.insert(ResultSlot::Select {
            query_id: 1,
            cursor: Cursor::empty(),
            holdable: true,
            server_query_ended: false,
        });
        let non_holdable = table.insert(ResultSlot::Select {
            query_id: 2,
            cursor: Cursor::empty(),
            holdable: false,
            server_query_ended: false,
        });

        let to_end = table.take_query_ids_to_end(false);
        let ids: Vec<u64> = to_end.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![2]);
        assert!(table.get(non_holdable).is_ok()); // not freed until caller acts
        assert!(table.get(holdable).is_ok());

        let to_end_all = table.take_query_ids_to_end(true);
        let ids: Vec<u64> = to_end_all.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
