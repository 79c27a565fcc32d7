//! Notifications delivered back to the engine.

use crate::codes::NotifyKind;
use crate::registry::Handle;

/// One `notify(handle, kind, code)` call owed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub handle: Handle,
    pub kind: NotifyKind,
    /// Raw engine code. `0` except for a failed connect.
    pub code: i32,
}

/// The engine's notification entry point.
///
/// Implemented for any `FnMut(Handle, NotifyKind, i32)`, so a closure that
/// forwards into the engine is enough.
pub trait NotifySink {
    fn notify(&mut self, handle: Handle, kind: NotifyKind, code: i32);
}

impl<F> NotifySink for F
where
    F: FnMut(Handle, NotifyKind, i32),
{
    fn notify(&mut self, handle: Handle, kind: NotifyKind, code: i32) {
        self(handle, kind, code)
    }
}
