//! Statistics and miscellaneous server-state queries (§4.4 "Statistics
//! and misc").

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::buffer::PackedWriter;
use crate::protocol::codec::{pack_oid, unpack_oid};
use crate::protocol::constants::Opcode;
use crate::value::Oid;

/// Per-class statistics as returned by the server's catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStatistics {
    pub class_oid: Oid,
    pub num_objects: i64,
    pub num_pages: i64,
}

/// A row of the packed transaction table (`logtb_get_pack_tran_table`).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInfo {
    pub tran_index: i32,
    pub user: String,
    pub host: String,
    pub program_name: String,
    pub query_exec_info: Option<String>,
}

impl Connection {
    pub async fn stats_get_statistics_from_server(&mut self, class_oid: Oid) -> Result<ClassStatistics> {
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &class_oid);
        let req: Bytes = w.freeze();
        let mut r = self
            .dispatcher
            .dispatch(Opcode::StatsGetStatistics, &[req])
            .await?;
        let class_oid = unpack_oid(&mut r)?;
        Ok(ClassStatistics {
            class_oid,
            num_objects: r.read_i64()?,
            num_pages: r.read_i64()?,
        })
    }

    pub async fn stats_update_statistics(&mut self, class_oid: Oid) -> Result<()> {
        let mut w = PackedWriter::new();
        pack_oid(&mut w, &class_oid);
        self.dispatcher
            .dispatch(Opcode::StatsUpdateStatistics, &[w.freeze()])
            .await?;
        Ok(())
    }

    pub async fn mnt_server_copy_stats(&mut self) -> Result<Vec<u8>> {
        let mut r = self.dispatcher.dispatch(Opcode::MntServerCopyStats, &[]).await?;
        let len = r.remaining();
        Ok(r.read_bytes(len)?.to_vec())
    }

    pub async fn mnt_server_global_stats(&mut self) -> Result<Vec<u8>> {
        let mut r = self.dispatcher.dispatch(Opcode::MntServerGlobalStats, &[]).await?;
        let len = r.remaining();
        Ok(r.read_bytes(len)?.to_vec())
    }

    /// Fetch the packed transaction table, unpacking rows into
    /// `TransactionInfo`. On a malformed row, already-unpacked strings are
    /// simply dropped with the `Vec` — Rust's ownership makes the
    /// original per-row manual free-on-error bookkeeping unnecessary.
    pub async fn logtb_get_pack_tran_table(&mut self, include_query_exec_info: bool) -> Result<Vec<TransactionInfo>> {
        let mut w = PackedWriter::new();
        w.write_u8(include_query_exec_info as u8);
        w.align8();
        let req: Bytes = w.freeze();
        let mut r = self
            .dispatcher
            .dispatch(Opcode::LogtbGetPackTranTable, &[req])
            .await?;
        let n = r.read_i32()? as usize;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let tran_index = r.read_i32()?;
            let user = r.read_string_prefixed()?;
            let host = r.read_string_prefixed()?;
            let program_name = r.read_string_prefixed()?;
            let query_exec_info = if include_query_exec_info {
                Some(r.read_string_prefixed()?)
            } else {
                None
            };
            out.push(TransactionInfo {
                tran_index,
                user,
                host,
                program_name,
                query_exec_info,
            });
        }
        Ok(out)
    }
}
