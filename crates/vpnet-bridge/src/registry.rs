//! Handle allocation and handle → connection resolution.

use std::collections::HashMap;
use std::fmt;

use crate::connection::Connection;

/// Opaque token identifying one connection to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns every live [`Connection`] and the handles naming them.
///
/// Handles are issued from a monotonic counter starting at 1 and are never
/// reissued, so a stale handle can only ever resolve to "not found".
pub struct ConnectionRegistry {
    connections: HashMap<Handle, Connection>,
    next: u64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next: 1,
        }
    }

    /// Issue a fresh handle and store the connection built for it.
    pub fn allocate(&mut self, build: impl FnOnce(Handle) -> Connection) -> Handle {
        let handle = Handle(self.next);
        self.next += 1;
        self.connections.insert(handle, build(handle));
        handle
    }

    /// Look up a live connection.
    pub fn resolve(&self, handle: Handle) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    /// Look up a live connection mutably.
    pub fn resolve_mut(&mut self, handle: Handle) -> Option<&mut Connection> {
        self.connections.get_mut(&handle)
    }

    /// Remove the mapping, handing the connection back to the caller.
    /// Returns `None` if the handle was already released or never issued.
    pub fn release(&mut self, handle: Handle) -> Option<Connection> {
        self.connections.remove(&handle)
    }

    /// Handles of all live connections, in no particular order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.connections.keys().copied()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
