//! Error type for bridge operations.

use crate::codes::ReturnCode;
use crate::registry::Handle;

/// Errors surfaced by [`Connection`](crate::Connection) and
/// [`Bridge`](crate::Bridge) operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Nothing is buffered yet. Not a failure; the engine retries after the
    /// next read-ready notification.
    #[error("no data available")]
    WouldBlock,

    /// The connection has no established stream to write to.
    #[error("connection is not established")]
    NotConnected,

    /// The handle was never issued or has already been destroyed.
    #[error("unknown connection handle {0}")]
    UnknownHandle(Handle),

    /// `connect` was called on a connection that already left the idle state.
    #[error("connection already started")]
    AlreadyConnecting,

    /// The async runtime backing the bridge could not be built.
    #[error("failed to start network runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl NetError {
    /// Engine code for this error.
    pub fn code(&self) -> ReturnCode {
        match self {
            Self::WouldBlock => ReturnCode::WouldBlock,
            _ => ReturnCode::ConnectionError,
        }
    }
}
