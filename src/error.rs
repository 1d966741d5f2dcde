//! Error types and the thread-local diagnostic stack.

use std::cell::RefCell;
use std::io;
use std::panic::Location;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Severity recorded alongside an error on the diagnostic stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// One entry on the thread-local diagnostic stack: file/line of the
/// constructing call plus the formatted arguments. Mirrors the `er_set`
/// macro's `(file, line, severity, args)` record collapsed into a single
/// constructor.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub file: &'static str,
    pub line: u32,
    pub severity: Severity,
    pub args: Vec<String>,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorRecord>> = const { RefCell::new(None) };
}

/// Install a record on the thread-local diagnostic stack.
pub fn set_last_error(record: ErrorRecord) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(record));
}

/// Read back the most recently installed diagnostic record, if any.
pub fn last_error() -> Option<ErrorRecord> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

/// Construct an `ErrorRecord` at the caller's location and install it.
macro_rules! record_error {
    ($severity:expr, $($arg:expr),*) => {{
        $crate::error::set_last_error($crate::error::ErrorRecord {
            file: file!(),
            line: line!(),
            severity: $severity,
            args: vec![$(format!("{}", $arg)),*],
        });
    }};
}
pub(crate) use record_error;

/// Error type for this crate's client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Unexpected reply shape for the opcode in flight.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// A read ran past the declared size of a reply buffer.
    #[error("buffer too small: need {needed} bytes, have {available}, at {location}")]
    BufferTooSmall {
        needed: usize,
        available: usize,
        location: &'static Location<'static>,
    },

    /// Out of virtual memory for a requested allocation size.
    #[error("out of virtual memory: requested {requested} bytes")]
    OutOfVirtualMemory { requested: usize },

    /// Invalid precision/scale supplied to a domain constructor (§4.1,
    /// warning-severity, not a fault).
    #[error("invalid numeric domain: precision={precision}, scale={scale}")]
    Domain { precision: u8, scale: u8 },

    /// Coercion between incompatible domains.
    #[error("cannot coerce {from} to {to}")]
    CannotCoerce { from: &'static str, to: &'static str },

    /// Coercion overflow.
    #[error("data overflow on {type_name}")]
    CoerceOverflow { type_name: &'static str },

    /// Arithmetic overflow, tagged by operator.
    #[error("overflow in {op}")]
    Overflow { op: &'static str },

    /// Division or modulo by zero where the operator defines it as an error.
    #[error("zero divide")]
    ZeroDivide,

    /// A scalar function received an argument outside its domain.
    #[error("function argument error in {function}")]
    FunctionArgError { function: &'static str },

    /// `pow` with a negative base and non-integer exponent, or other
    /// power-specific domain violation.
    #[error("power error")]
    PowerError,

    /// Operation attempted on a query result in the CLOSED state.
    #[error("operation on closed query result")]
    OprOnClosedQres,

    /// Result type does not support the requested accessor (e.g. calling
    /// tuple navigation on a CALL result, or vice versa).
    #[error("invalid result type for operation")]
    InvalidRestype,

    /// Column index outside `[0, column_count)`.
    #[error("invalid tuple value index {index} (columns: {count})")]
    InvalidTplvalIndex { index: usize, count: usize },

    /// `set_tplpos` given a checkpoint that no longer resolves.
    #[error("unknown cursor position")]
    UnknownCrspos,

    /// Failed to allocate a list-file page or copy-area buffer.
    #[error("cannot allocate buffer of {size} bytes")]
    CantAllocBuffer { size: usize },

    /// A reply buffer could not be fully read from the server.
    #[error("network server data receive error")]
    NetServerDataReceive,

    /// Transaction operation only valid in standalone mode.
    #[error("operation only valid in standalone mode")]
    OnlyInStandalone,

    /// Transaction operation not valid in standalone mode.
    #[error("operation not valid in standalone mode")]
    NotInStandalone,

    /// LZO compression failed (compressed size mismatch or zero length).
    #[error("LZO compress failed")]
    LzoCompressFail,

    /// LZO decompression failed (decompressed size mismatch).
    #[error("LZO decompress failed")]
    LzoDecompressFail,

    /// A received data packet exceeded the negotiated session IO size.
    #[error("backup data size mismatch: expected at most {expected}, got {actual}")]
    DatasizeMismatch { expected: usize, actual: usize },

    /// Destination partition lacks the minimum free pages for a backup.
    #[error("not enough free space for backup: need {needed_pages} pages")]
    FormatOutOfSpace { needed_pages: u64 },

    /// A write to the backup volume hit ENOSPC.
    #[error("backup volume out of space while writing")]
    WriteOutOfSpace,

    /// The backup destination already exists and overwrite was not forced.
    #[error("backup destination already exists: {path}")]
    BackupDestinationExists { path: String },

    /// A server-reported error with a numeric code and message.
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },
}

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
