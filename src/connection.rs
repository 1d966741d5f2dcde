//! The top-level connection handle: owns the dispatcher, the
//! query-result table, and the connection-local reset flag. One
//! `Connection` is driven by a single caller at a time — nothing here
//! spawns a background task; every suspension point is an `.await` in the
//! calling task.

use crate::error::Result;
use crate::protocol::dispatch::Dispatcher;
use crate::protocol::transport::PacketStream;
use crate::query::ResultTable;

/// Parameters needed to open a connection: `host:port/database`. This is
/// the boundary a config loader would populate; parsing a config file
/// format is out of scope (§1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub program: String,
}

impl ConnectParams {
    /// Parse `host:port/database` with an implicit default user/program.
    pub fn parse(connect_string: &str) -> Result<Self> {
        let (host_port, database) = connect_string
            .split_once('/')
            .ok_or_else(|| crate::error::Error::protocol("missing '/database' in connect string"))?;
        let (host, port) = host_port
            .split_once(':')
            .ok_or_else(|| crate::error::Error::protocol("missing ':port' in connect string"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| crate::error::Error::protocol(format!("invalid port {port}")))?;
        Ok(ConnectParams {
            host: host.to_string(),
            port,
            database: database.to_string(),
            user: "public".to_string(),
            program: env!("CARGO_PKG_NAME").to_string(),
        })
    }
}

/// Whether the next API call should reuse this connection as-is, or must
/// first reconnect to an active server (§4.4, §7: "the client flips its
/// connection status to RESET").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Normal,
    Reset,
}

/// A live connection to a database server.
pub struct Connection {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) status: ConnStatus,
    pub(crate) results: ResultTable,
    pub(crate) session_id: Option<crate::session::SessionId>,
    pub(crate) in_transaction: bool,
    pub(crate) standalone: bool,
}

impl Connection {
    /// Open a TCP connection and perform session establishment (§4.4
    /// "Session API" folded into connect, per §9's resolution of the
    /// `clogin_user` open question).
    pub async fn connect(params: &ConnectParams) -> Result<Self> {
        let stream = PacketStream::connect((params.host.as_str(), params.port)).await?;
        let mut conn = Connection {
            dispatcher: Dispatcher::new(stream),
            status: ConnStatus::Normal,
            results: ResultTable::new(),
            session_id: None,
            in_transaction: false,
            standalone: false,
        };
        let session = conn.find_or_create_session(&params.user, &params.host, &params.program).await?;
        conn.session_id = Some(session.id);
        Ok(conn)
    }

    pub fn status(&self) -> ConnStatus {
        self.status
    }

    pub(crate) fn mark_reset(&mut self) {
        self.status = ConnStatus::Reset;
    }

    pub fn results(&self) -> &ResultTable {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut ResultTable {
        &mut self.results
    }
}
