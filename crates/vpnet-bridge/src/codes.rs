//! Integer tables shared with the engine.
//!
//! The engine speaks plain integers across its network vtable: a notification
//! kind plus a signed result code. These enums are the typed view of those
//! values; [`NotifyKind::as_raw`] and [`ReturnCode::as_raw`] produce what the
//! engine expects on the wire of its callback.

use std::fmt;

/// Kind of notification raised toward the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NotifyKind {
    /// Outcome of a connect attempt. The code is [`ReturnCode::Success`] or
    /// [`ReturnCode::ConnectionError`].
    Connect = 0,
    /// The established stream was closed by the peer or by a transport error.
    Disconnect = 1,
    /// New bytes were buffered and can be drained with `recv`.
    ReadReady = 2,
    /// Reserved by the engine. Never raised by the bridge.
    WriteReady = 3,
    /// The connection's watchdog timer expired.
    Timeout = 4,
}

impl NotifyKind {
    /// Raw engine value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Error returned when an integer does not name a [`NotifyKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification kind {0}")]
pub struct UnknownNotifyKind(pub i32);

impl TryFrom<i32> for NotifyKind {
    type Error = UnknownNotifyKind;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Connect),
            1 => Ok(Self::Disconnect),
            2 => Ok(Self::ReadReady),
            3 => Ok(Self::WriteReady),
            4 => Ok(Self::Timeout),
            other => Err(UnknownNotifyKind(other)),
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ReadReady => "read-ready",
            Self::WriteReady => "write-ready",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Result codes shared by vtable returns and notification payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReturnCode {
    Success = 0,
    ConnectionError = -1,
    /// Only ever returned by `recv`: nothing is buffered yet.
    WouldBlock = -2,
}

impl ReturnCode {
    /// Raw engine value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}
