//! Events posted by transport tasks for the engine thread to apply.
//!
//! Transport tasks never touch connection state. Everything they observe is
//! sent through one channel and applied by the bridge on the engine thread,
//! in the order it was posted.

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::registry::Handle;

/// What a transport task observed.
#[derive(Debug)]
pub enum TransportEvent {
    /// The TCP handshake completed.
    Connected,
    /// Resolution, refusal, or connect timeout before establishment.
    ConnectFailed(std::io::Error),
    /// A read completed with these bytes.
    Data(Bytes),
    /// The established stream ended, orderly or not.
    Closed,
    /// A timer armed with this generation fired.
    TimerExpired(u64),
}

/// A [`TransportEvent`] tagged with the connection it belongs to.
#[derive(Debug)]
pub struct Envelope {
    pub handle: Handle,
    pub event: TransportEvent,
}

/// Cloneable sending side handed to every transport task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Envelope>,
}

impl EventSender {
    /// Post an event. A closed channel means the bridge is gone, so the event
    /// is dropped.
    pub fn post(&self, handle: Handle, event: TransportEvent) {
        let _ = self.tx.send(Envelope { handle, event });
    }
}

/// Create the bridge's event channel.
pub fn channel() -> (EventSender, Receiver<Envelope>) {
    let (tx, rx) = unbounded();
    (EventSender { tx }, rx)
}
