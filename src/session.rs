//! Session establishment (§4.4 "Session API"). Login is folded into
//! `find_or_create_session` per §9's resolution of the `clogin_user` open
//! question: there is no separate login opcode.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::buffer::PackedWriter;
use crate::protocol::constants::Opcode;

/// An opaque session identifier issued by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionId(pub u64);

/// The matching session key, used to re-establish a session the server
/// still recognises across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionKey(pub u64);

/// The server's response to a session lookup/creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub key: SessionKey,
}

impl Connection {
    /// Send the current (possibly empty) session id/key; the server
    /// allocates a new session if it doesn't recognise them.
    pub async fn find_or_create_session(&mut self, user: &str, host: &str, program: &str) -> Result<Session> {
        let mut w = PackedWriter::new();
        let (id, key) = match self.session_id {
            Some(id) => (id.0, 0u64),
            None => (0u64, 0u64),
        };
        w.write_u64(id);
        w.write_u64(key);
        w.write_string_prefixed(user);
        w.write_string_prefixed(host);
        w.write_string_prefixed(program);
        let req: Bytes = w.freeze();

        let mut r = self
            .dispatcher
            .dispatch(Opcode::CsessionFindOrCreateSession, &[req])
            .await?;
        let session_id = SessionId(r.read_u64()?);
        let session_key = SessionKey(r.read_u64()?);
        Ok(Session {
            id: session_id,
            key: session_key,
        })
    }

    /// Tear down a session explicitly.
    pub async fn end_session(&mut self, session: SessionId) -> Result<()> {
        let mut w = PackedWriter::new();
        w.write_u64(session.0);
        self.dispatcher
            .dispatch(Opcode::CsessionEndSession, &[w.freeze()])
            .await?;
        Ok(())
    }
}
