//! The packed wire protocol: constants, the typed buffer cursor, the
//! composite codec, the framing transport, and the request dispatcher.

pub mod buffer;
pub mod codec;
pub mod constants;
pub mod dispatch;
pub mod transport;
