//! Socket bridge for a single-threaded host engine.
//!
//! The engine expects classic socket calls (`connect`, `send`, `recv`,
//! `timeout`) that return immediately, plus a `notify(handle, kind, code)`
//! callback when something changes. This crate serves those calls from tokio
//! TCP streams: async tasks post events into one channel, and the engine
//! thread applies them to per-connection state when it drains notifications.

pub mod bridge;
pub mod byte_queue;
pub mod codes;
pub mod connection;
pub mod error;
pub mod event;
pub mod notify;
pub mod registry;
pub mod transport;

pub use bridge::{Bridge, BridgeSettings, NetDriver};
pub use byte_queue::ByteQueue;
pub use codes::{NotifyKind, ReturnCode, UnknownNotifyKind};
pub use connection::{Connection, ConnectionState};
pub use error::NetError;
pub use notify::{Notification, NotifySink};
pub use registry::{ConnectionRegistry, Handle};
