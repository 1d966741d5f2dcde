//! B-tree index operations (§4.4): add/load/delete/find-unique.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Result;
use crate::idxkey::IdxKey;
use crate::protocol::buffer::PackedWriter;
use crate::protocol::codec::{pack_btid, pack_idxkey, pack_oid, unpack_btid, unpack_oid, Btid};
use crate::protocol::constants::Opcode;
use crate::value::{Domain, Oid};

/// Result of `btree_find_unique` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindUniqueStatus {
    Ok,
    NotFound,
    Error,
}

impl Connection {
    /// Create a new unique/non-unique index over `class_oid`'s
    /// `attr_id`-th attribute of the given `attr_type`s. On failure the
    /// returned `Btid` is [`Btid::NULL`] (vfid null, root pageid
    /// `NULL_PAGEID`), matching §4.4's guarantee.
    pub async fn btree_add_index(
        &mut self,
        attr_types: &[Domain],
        class_oid: Oid,
        attr_id: i32,
    ) -> Result<Btid> {
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &class_oid);
        w.write_i32(attr_id);
        w.write_i32(attr_types.len() as i32);
        for t in attr_types {
            w.write_i32(domain_code(*t));
        }
        let req: Bytes = w.freeze();
        let mut r = self.dispatcher.dispatch(Opcode::BtreeAddIndex, &[req]).await?;
        let ok = r.read_u8()? != 0;
        r.align8()?;
        let btid = unpack_btid(&mut r)?;
        if ok {
            Ok(btid)
        } else {
            Ok(Btid::NULL)
        }
    }

    /// Look up `key` (a single-component VARCHAR idxkey per §4.4's
    /// assertion) in `btid` belonging to `class_oid`.
    pub async fn btree_find_unique(
        &mut self,
        class_oid: Oid,
        btid: Btid,
        key: &IdxKey,
    ) -> Result<(FindUniqueStatus, Oid)> {
        debug_assert_eq!(key.len(), 1, "btree_find_unique key must have exactly one component");
        debug_assert!(
            matches!(key.values().first().map(|v| v.domain()), Some(Domain::Varchar { .. })),
            "btree_find_unique key component must be VARCHAR"
        );
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &class_oid);
        pack_btid(&mut w, &btid);
        pack_idxkey(&mut w, key);
        let req: Bytes = w.freeze();
        let mut r = self.dispatcher.dispatch(Opcode::BtreeFindUnique, &[req]).await?;
        let status = match r.read_i32()? {
            0 => FindUniqueStatus::Ok,
            -1 => FindUniqueStatus::NotFound,
            _ => FindUniqueStatus::Error,
        };
        let oid = unpack_oid(&mut r)?;
        Ok((status, oid))
    }

    pub async fn btree_load_data(&mut self, btid: Btid, class_oid: Oid, attr_id: i32) -> Result<bool> {
        let mut w = PackedWriter::new();
        pack_btid(&mut w, &btid);
        pack_oid(&mut w, &class_oid);
        w.write_i32(attr_id);
        let mut r = self.dispatcher.dispatch(Opcode::BtreeLoadData, &[w.freeze()]).await?;
        Ok(r.read_u8()? != 0)
    }

    pub async fn btree_delete_index(&mut self, btid: Btid) -> Result<bool> {
        let mut w = PackedWriter::new();
        pack_btid(&mut w, &btid);
        let mut r = self
            .dispatcher
            .dispatch(Opcode::BtreeDeleteIndex, &[w.freeze()])
            .await?;
        Ok(r.read_u8()? != 0)
    }
}

fn domain_code(d: Domain) -> i32 {
    match d {
        Domain::Null => 0,
        Domain::Integer => 1,
        Domain::Bigint => 2,
        Domain::Double => 3,
        Domain::Numeric { .. } => 4,
        Domain::Varchar { .. } => 5,
        Domain::Varbit { .. } => 6,
        Domain::Date => 7,
        Domain::Time => 8,
        Domain::Datetime => 9,
        Domain::Oid => 10,
        Domain::Sequence => 11,
        Domain::Resultset => 12,
    }
}

