//! Locator operations (§4.4): fetch/force records between client and
//! server via copy areas, plus the small class-name/OID opcodes.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::lock::LockMode;
use crate::protocol::buffer::PackedWriter;
use crate::protocol::codec::{pack_lockhint, pack_lockset, pack_oid, unpack_oid, LockHint, LockSet};
use crate::protocol::constants::Opcode;
use crate::value::Oid;

/// One entry in a copy area's descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub oid: Oid,
    pub hfid_fileid: i32,
    pub offset: u32,
    pub length: u32,
    pub operation: ObjectOperation,
}

/// The operation a copy-area entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOperation {
    Fetch,
    Insert,
    Update,
    Delete,
}

/// A contiguous buffer holding a descriptor table and a content blob, used
/// to ship fetched/forced records between client and server (§4.4,
/// GLOSSARY "Copy area"). The descriptor table and content blob are kept
/// as separate owned buffers here rather than one memcpy'd region — Rust
/// ownership makes the split free to model without the server's inline
/// layout trick.
#[derive(Debug, Clone, Default)]
pub struct CopyArea {
    pub descriptors: Vec<ObjectDescriptor>,
    pub content: Vec<u8>,
}

fn operation_code(op: ObjectOperation) -> i32 {
    match op {
        ObjectOperation::Fetch => 0,
        ObjectOperation::Insert => 1,
        ObjectOperation::Update => 2,
        ObjectOperation::Delete => 3,
    }
}

fn operation_from_code(code: i32) -> Result<ObjectOperation> {
    Ok(match code {
        0 => ObjectOperation::Fetch,
        1 => ObjectOperation::Insert,
        2 => ObjectOperation::Update,
        3 => ObjectOperation::Delete,
        other => return Err(Error::protocol(format!("unknown copy-area operation {other}"))),
    })
}

/// Small status enum shared by the locator name opcodes (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStatus {
    Ok,
    Error,
    NotFound,
}

fn status_from_code(code: i32) -> LocatorStatus {
    match code {
        0 => LocatorStatus::Ok,
        -1 => LocatorStatus::NotFound,
        _ => LocatorStatus::Error,
    }
}

impl Connection {
    /// Fetch an object by OID under the given lock, returning its copy
    /// area, or `None` on a reported failure (§4.4).
    pub async fn locator_fetch(
        &mut self,
        oid: Oid,
        lock: LockMode,
        class_oid: Oid,
        prefetch: bool,
    ) -> Result<Option<CopyArea>> {
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &oid);
        w.write_i32(lock as i32);
        pack_oid(&mut w, &class_oid);
        w.write_u8(prefetch as u8);
        w.align8();
        let req: Bytes = w.freeze();

        let mut r = self.dispatcher.dispatch(Opcode::LocatorFetch, &[req]).await?;
        let success = r.read_u8()? != 0;
        r.align8()?;
        if !success {
            return Ok(None);
        }
        let num_objects = r.read_i32()? as usize;
        let content_size = r.read_i32()? as usize;
        let mut descriptors = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            let oid = unpack_oid(&mut r)?;
            let hfid_fileid = r.read_i32()?;
            let offset = r.read_u32()?;
            let length = r.read_u32()?;
            let operation = operation_from_code(r.read_i32()?)?;
            descriptors.push(ObjectDescriptor {
                oid,
                hfid_fileid,
                offset,
                length,
                operation,
            });
        }
        let content = r.read_bytes(content_size)?.to_vec();
        Ok(Some(CopyArea { descriptors, content }))
    }

    /// Send a caller-built copy area back to the server to apply (force or
    /// replicated force), splitting it into descriptor and content halves.
    async fn locator_send_copy_area(&mut self, op: Opcode, area: &CopyArea) -> Result<LocatorStatus> {
        let mut w = PackedWriter::new();
        w.write_i32(area.descriptors.len() as i32);
        w.write_i32(area.content.len() as i32);
        for d in &area.descriptors {
            pack_oid(&mut w, &d.oid);
            w.write_i32(d.hfid_fileid);
            w.write_u32(d.offset);
            w.write_u32(d.length);
            w.write_i32(operation_code(d.operation));
        }
        w.write_bytes(&area.content);
        let req: Bytes = w.freeze();
        let mut r = self.dispatcher.dispatch(op, &[req]).await?;
        Ok(status_from_code(r.read_i32()?))
    }

    pub async fn locator_force(&mut self, area: &CopyArea) -> Result<LocatorStatus> {
        self.locator_send_copy_area(Opcode::LocatorForce, area).await
    }

    pub async fn locator_repl_force(&mut self, area: &CopyArea) -> Result<LocatorStatus> {
        self.locator_send_copy_area(Opcode::LocatorReplForce, area).await
    }

    /// Fetch a lockset via the split send/recv dispatcher. `set` tracks
    /// its own `first_fetch_call` flag so a retry only ships the opcode
    /// and exchange id, not the full bundle again.
    pub async fn locator_fetch_lockset(&mut self, set: &mut LockSet) -> Result<Vec<CopyArea>> {
        let is_retry = !set.first_fetch_call;
        let req = if is_retry {
            vec![]
        } else {
            let mut w = PackedWriter::new();
            pack_lockset(&mut w, set);
            vec![w.freeze()]
        };
        let id = self
            .dispatcher
            .send_msg(Opcode::LocatorFetchLockset, &req, is_retry)
            .await?;
        set.first_fetch_call = false;
        let mut r = self.dispatcher.recv_msg(id, None).await?;
        let n = r.read_i32()? as usize;
        let mut areas = Vec::with_capacity(n);
        for _ in 0..n {
            let num_objects = r.read_i32()? as usize;
            let content_size = r.read_i32()? as usize;
            let mut descriptors = Vec::with_capacity(num_objects);
            for _ in 0..num_objects {
                let oid = unpack_oid(&mut r)?;
                let hfid_fileid = r.read_i32()?;
                let offset = r.read_u32()?;
                let length = r.read_u32()?;
                let operation = operation_from_code(r.read_i32()?)?;
                descriptors.push(ObjectDescriptor {
                    oid,
                    hfid_fileid,
                    offset,
                    length,
                    operation,
                });
            }
            let content = r.read_bytes(content_size)?.to_vec();
            areas.push(CopyArea { descriptors, content });
        }
        Ok(areas)
    }

    /// Fetch a lock-hint bundle of classes via the same split dispatcher.
    pub async fn locator_fetch_lockhint_classes(&mut self, hint: &mut LockHint) -> Result<Vec<Oid>> {
        let is_retry = !hint.first_fetch_call;
        let req = if is_retry {
            vec![]
        } else {
            let mut w = PackedWriter::new();
            pack_lockhint(&mut w, hint);
            vec![w.freeze()]
        };
        let id = self
            .dispatcher
            .send_msg(Opcode::LocatorFetchLockhintClasses, &req, is_retry)
            .await?;
        hint.first_fetch_call = false;
        let mut r = self.dispatcher.recv_msg(id, None).await?;
        let n = r.read_i32()? as usize;
        let mut oids = Vec::with_capacity(n);
        for _ in 0..n {
            oids.push(unpack_oid(&mut r)?);
        }
        Ok(oids)
    }

    pub async fn locator_find_class_oid(&mut self, class_name: &str) -> Result<(LocatorStatus, Oid)> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(class_name);
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LocatorFindClassOid, &[w.freeze()])
            .await?;
        let status = status_from_code(r.read_i32()?);
        let oid = unpack_oid(&mut r)?;
        Ok((status, oid))
    }

    pub async fn locator_reserve_class_names(&mut self, names: &[String]) -> Result<LocatorStatus> {
        let mut w = PackedWriter::new();
        w.write_i32(names.len() as i32);
        for n in names {
            w.write_string_prefixed(n);
        }
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LocatorReserveClassNames, &[w.freeze()])
            .await?;
        Ok(status_from_code(r.read_i32()?))
    }

    pub async fn locator_delete_class_name(&mut self, name: &str) -> Result<LocatorStatus> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(name);
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LocatorDeleteClassName, &[w.freeze()])
            .await?;
        Ok(status_from_code(r.read_i32()?))
    }

    pub async fn locator_rename_class_name(&mut self, old_name: &str, new_name: &str) -> Result<LocatorStatus> {
        let mut w = PackedWriter::new();
        w.write_string_prefixed(old_name);
        w.write_string_prefixed(new_name);
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LocatorRenameClassName, &[w.freeze()])
            .await?;
        Ok(status_from_code(r.read_i32()?))
    }

    pub async fn locator_assign_oid(&mut self, class_oid: Oid) -> Result<(LocatorStatus, Oid)> {
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &class_oid);
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LocatorAssignOid, &[w.freeze()])
            .await?;
        let status = status_from_code(r.read_i32()?);
        let oid = unpack_oid(&mut r)?;
        Ok((status, oid))
    }
}

