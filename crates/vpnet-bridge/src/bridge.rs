//! The object the engine is configured with.
//!
//! [`Bridge`] owns the registry, the async runtime the sockets live on, and
//! the event channel those sockets report through. The engine calls it
//! synchronously and drains notifications with [`Bridge::poll`],
//! [`Bridge::dispatch`] or [`Bridge::wait`]; nothing is ever delivered from
//! inside another bridge call.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tokio::runtime::{Handle as RuntimeHandle, Runtime};

use crate::connection::{Connection, ConnectionState};
use crate::error::NetError;
use crate::event::{self, Envelope};
use crate::notify::{Notification, NotifySink};
use crate::registry::{ConnectionRegistry, Handle};
use crate::transport::Transport;

/// Configuration for [`Bridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Give up on a connect attempt after this long. Default: 10 s.
    pub connect_timeout: Option<Duration>,
    /// Set `TCP_NODELAY` on established streams. Default: true.
    pub nodelay: bool,
    /// Read buffer reserved per socket read. Default: 16 KiB.
    pub read_buffer_size: usize,
    /// Worker threads of an owned runtime. Default: 1.
    pub worker_threads: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
            read_buffer_size: 16 * 1024,
            worker_threads: 1,
        }
    }
}

/// Engine network vtable: the six entry points in the engine's calling
/// convention.
///
/// Integer returns are a byte count or a negative
/// [`ReturnCode`](crate::ReturnCode); negative timeouts disarm.
pub trait NetDriver {
    fn create(&mut self) -> Handle;
    fn destroy(&mut self, handle: Handle);
    fn connect(&mut self, handle: Handle, host: &str, port: u16) -> i32;
    fn send(&mut self, handle: Handle, data: &[u8]) -> i32;
    fn recv(&mut self, handle: Handle, dest: &mut [u8]) -> i32;
    fn timeout(&mut self, handle: Handle, seconds: i32) -> i32;
}

/// Connection registry plus the async machinery behind it.
pub struct Bridge {
    // Connections drop first so their tasks are aborted before the runtime
    // shuts down.
    registry: ConnectionRegistry,
    transport: Transport,
    events: Receiver<Envelope>,
    _runtime: Option<Runtime>,
}

impl Bridge {
    /// Create a bridge with its own multi-threaded runtime.
    ///
    /// Must not be dropped from inside an async context.
    pub fn new(settings: BridgeSettings) -> Result<Self, NetError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.worker_threads.max(1))
            .thread_name("vpnet-io")
            .enable_all()
            .build()
            .map_err(NetError::Runtime)?;
        let handle = runtime.handle().clone();
        let mut bridge = Self::with_runtime(handle, settings);
        bridge._runtime = Some(runtime);
        Ok(bridge)
    }

    /// Create a bridge that spawns onto an existing runtime.
    pub fn with_runtime(runtime: RuntimeHandle, settings: BridgeSettings) -> Self {
        let (sender, events) = event::channel();
        tracing::debug!("Network bridge started with {settings:?}");
        Self {
            registry: ConnectionRegistry::new(),
            transport: Transport::new(runtime, sender, settings),
            events,
            _runtime: None,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        self.transport.settings()
    }

    /// Allocate an idle connection.
    pub fn create(&mut self) -> Handle {
        let handle = self.registry.allocate(Connection::new);
        tracing::debug!("Connection {handle} created");
        handle
    }

    /// Tear down a connection and invalidate its handle. Events it already
    /// posted are discarded when they are drained.
    pub fn destroy(&mut self, handle: Handle) -> Result<(), NetError> {
        let mut connection = self
            .registry
            .release(handle)
            .ok_or(NetError::UnknownHandle(handle))?;
        connection.destroy();
        Ok(())
    }

    /// Start connecting. The outcome arrives as a `Connect` notification.
    pub fn connect(&mut self, handle: Handle, host: &str, port: u16) -> Result<(), NetError> {
        let connection = lookup(&mut self.registry, handle)?;
        connection.connect(&self.transport, host, port)
    }

    pub fn send(&mut self, handle: Handle, data: &[u8]) -> Result<usize, NetError> {
        lookup(&mut self.registry, handle)?.send(data)
    }

    pub fn recv(&mut self, handle: Handle, dest: &mut [u8]) -> Result<usize, NetError> {
        lookup(&mut self.registry, handle)?.recv(dest)
    }

    /// Re-arm (`Some`) or disarm (`None`) the connection's watchdog.
    pub fn set_timeout(&mut self, handle: Handle, after: Option<Duration>) -> Result<(), NetError> {
        let connection = lookup(&mut self.registry, handle)?;
        connection.set_timeout(&self.transport, after)
    }

    /// State of a live connection.
    pub fn state(&self, handle: Handle) -> Option<ConnectionState> {
        self.registry.resolve(handle).map(Connection::state)
    }

    /// Bytes waiting for `recv` on a live connection.
    pub fn buffered(&self, handle: Handle) -> Option<usize> {
        self.registry.resolve(handle).map(Connection::buffered)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Apply queued transport events until one produces a notification.
    /// Never blocks.
    pub fn poll(&mut self) -> Option<Notification> {
        while let Ok(envelope) = self.events.try_recv() {
            if let Some(notification) = self.apply(envelope) {
                return Some(notification);
            }
        }
        None
    }

    /// Like [`poll`](Self::poll), but block up to `timeout` for the next
    /// notification. A timeout too large to form a deadline blocks until one
    /// arrives.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Option<Notification> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.poll_blocking();
        };
        loop {
            if let Some(notification) = self.poll() {
                return Some(notification);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(notification) = self.apply(envelope) {
                        return Some(notification);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn poll_blocking(&mut self) -> Option<Notification> {
        loop {
            if let Some(notification) = self.poll() {
                return Some(notification);
            }
            let envelope = self.events.recv().ok()?;
            if let Some(notification) = self.apply(envelope) {
                return Some(notification);
            }
        }
    }

    /// Deliver every notification available right now. Returns how many were
    /// delivered.
    pub fn dispatch<S: NotifySink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut delivered = 0;
        while let Some(notification) = self.poll() {
            deliver(sink, notification);
            delivered += 1;
        }
        delivered
    }

    /// Block up to `timeout` for the first notification, then deliver it and
    /// everything else already available.
    pub fn wait<S: NotifySink + ?Sized>(&mut self, sink: &mut S, timeout: Duration) -> usize {
        match self.poll_timeout(timeout) {
            Some(first) => {
                deliver(sink, first);
                1 + self.dispatch(sink)
            }
            None => 0,
        }
    }

    fn apply(&mut self, envelope: Envelope) -> Option<Notification> {
        let Envelope { handle, event } = envelope;
        let Some(connection) = self.registry.resolve_mut(handle) else {
            tracing::trace!("Dropping {event:?} for released connection {handle}");
            return None;
        };
        let (kind, code) = connection.apply(event)?;
        Some(Notification {
            handle,
            kind,
            code: code.as_raw(),
        })
    }
}

impl NetDriver for Bridge {
    fn create(&mut self) -> Handle {
        Bridge::create(self)
    }

    fn destroy(&mut self, handle: Handle) {
        if let Err(e) = Bridge::destroy(self, handle) {
            tracing::warn!("destroy ignored: {e}");
        }
    }

    fn connect(&mut self, handle: Handle, host: &str, port: u16) -> i32 {
        to_engine(Bridge::connect(self, handle, host, port).map(|()| 0))
    }

    fn send(&mut self, handle: Handle, data: &[u8]) -> i32 {
        to_engine(Bridge::send(self, handle, data).map(saturate))
    }

    fn recv(&mut self, handle: Handle, dest: &mut [u8]) -> i32 {
        to_engine(Bridge::recv(self, handle, dest).map(saturate))
    }

    fn timeout(&mut self, handle: Handle, seconds: i32) -> i32 {
        let after = u64::try_from(seconds).ok().map(Duration::from_secs);
        to_engine(self.set_timeout(handle, after).map(|()| 0))
    }
}

fn lookup(registry: &mut ConnectionRegistry, handle: Handle) -> Result<&mut Connection, NetError> {
    registry
        .resolve_mut(handle)
        .ok_or(NetError::UnknownHandle(handle))
}

fn deliver<S: NotifySink + ?Sized>(sink: &mut S, notification: Notification) {
    sink.notify(notification.handle, notification.kind, notification.code);
}

fn to_engine(result: Result<i32, NetError>) -> i32 {
    match result {
        Ok(value) => value,
        Err(e @ NetError::UnknownHandle(_)) => {
            tracing::warn!("{e}");
            e.code().as_raw()
        }
        Err(e) => e.code().as_raw(),
    }
}

fn saturate(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
