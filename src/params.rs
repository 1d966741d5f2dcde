//! Server system parameters (§4.4 "Parameters").

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::buffer::{PackedReader, PackedWriter};
use crate::protocol::codec::{pack_value, unpack_value};
use crate::protocol::constants::Opcode;
use crate::value::DbValue;

/// One `name = value` system parameter assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamAssignment {
    pub name: String,
    pub value: DbValue,
}

/// The outcome of a parameter change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysprmErr {
    Ok,
    Error,
}

fn pack_assignments(w: &mut PackedWriter, assignments: &[ParamAssignment]) {
    w.write_i32(assignments.len() as i32);
    for a in assignments {
        w.write_string_prefixed(&a.name);
        pack_value(w, &a.value);
    }
}

fn unpack_assignments(r: &mut PackedReader) -> Result<Vec<ParamAssignment>> {
    let n = r.read_i32()? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.read_string_prefixed()?;
        let value = unpack_value(r)?;
        out.push(ParamAssignment { name, value });
    }
    Ok(out)
}

impl Connection {
    /// Push a batch of parameter assignments to the server.
    pub async fn change_server_parameters(&mut self, assignments: &[ParamAssignment]) -> Result<SysprmErr> {
        let mut w = PackedWriter::new();
        pack_assignments(&mut w, assignments);
        let req: Bytes = w.freeze();
        let mut r = self
            .dispatcher
            .dispatch(Opcode::ChangeServerParameters, &[req])
            .await?;
        Ok(if r.read_i32()? == 0 { SysprmErr::Ok } else { SysprmErr::Error })
    }

    /// Fetch the current values for the named parameters, replacing the
    /// caller's value list with the server-updated one.
    pub async fn obtain_server_parameters(&mut self, names: &[String]) -> Result<Vec<ParamAssignment>> {
        let mut w = PackedWriter::new();
        w.write_i32(names.len() as i32);
        for name in names {
            w.write_string_prefixed(name);
        }
        let req: Bytes = w.freeze();
        let mut r = self
            .dispatcher
            .dispatch(Opcode::ObtainServerParameters, &[req])
            .await?;
        unpack_assignments(&mut r)
    }

    /// Fetch parameters the server flags as server-forced.
    pub async fn get_force_server_parameters(&mut self) -> Result<Vec<ParamAssignment>> {
        let mut r = self
            .dispatcher
            .dispatch(Opcode::GetForceServerParameters, &[])
            .await?;
        unpack_assignments(&mut r)
    }
}

