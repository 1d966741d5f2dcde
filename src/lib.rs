//! Client-embedded database runtime core.
//!
//! A pure Rust client for a CUBRID/rye-style packed binary wire protocol:
//! connect and session negotiation, locator/heap/btree catalog ops,
//! query preparation and cursor-based result iteration, transaction
//! boundaries, arithmetic and lock algebra shared with the server's own
//! kernel, and a streaming full-backup driver.
//!
//! # Example
//!
//! ```no_run
//! use rye_client_rs::{Connection, ConnectParams, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let params = ConnectParams::parse("localhost:1523/demodb")?;
//!     let mut conn = Connection::connect(&params).await?;
//!
//!     let plan = conn
//!         .qmgr_prepare_query("select 1", "select 1", Default::default(), &[])
//!         .await?;
//!     let (handle, _status) = conn.qmgr_execute_query(plan.xasl_id, &[], false).await?;
//!     conn.first_tuple(handle)?;
//!     let row = conn.get_tuple_value_list(handle)?;
//!     println!("{row:?}");
//!
//!     conn.tran_server_commit(false).await?;
//!     Ok(())
//! }
//! ```

pub mod arithmetic;
pub mod backup;
pub mod btree;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod heap;
pub mod idxkey;
pub mod locator;
pub mod lock;
pub mod params;
pub mod protocol;
pub mod query;
pub mod session;
pub mod stats;
pub mod transaction;
pub mod value;

pub use backup::{run_backup, BackupHeader, BackupOptions, BackupSession};
pub use connection::{ConnStatus, ConnectParams, Connection};
pub use cursor::{Cursor, NavOutcome, SeekMode, TuplePos};
pub use error::{Error, Result};
pub use query::{ExecuteStatus, PreparedPlan, ResultHandle};
pub use value::{DbValue, Domain, Oid};
