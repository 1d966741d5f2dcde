//! Heap file operations (§4.4): `heap_create`/`heap_destroy`.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::buffer::PackedWriter;
use crate::protocol::codec::{pack_hfid, pack_oid, unpack_hfid, Hfid};
use crate::protocol::constants::Opcode;
use crate::value::Oid;

impl Connection {
    /// Create a heap file for `class_oid`, returning the allocated `Hfid`.
    pub async fn heap_create(&mut self, class_oid: Oid) -> Result<Hfid> {
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &class_oid);
        let req: Bytes = w.freeze();
        let mut r = self.dispatcher.dispatch(Opcode::HeapCreate, &[req]).await?;
        let ok = r.read_u8()? != 0;
        r.align8()?;
        let hfid = unpack_hfid(&mut r)?;
        if ok {
            Ok(hfid)
        } else {
            Err(crate::error::Error::protocol("heap_create failed"))
        }
    }

    pub async fn heap_destroy(&mut self, hfid: Hfid) -> Result<()> {
        let mut w = PackedWriter::new();
        pack_hfid(&mut w, &hfid);
        let mut r = self.dispatcher.dispatch(Opcode::HeapDestroy, &[w.freeze()]).await?;
        let ok = r.read_u8()? != 0;
        if ok {
            Ok(())
        } else {
            Err(crate::error::Error::protocol("heap_destroy failed"))
        }
    }
}
