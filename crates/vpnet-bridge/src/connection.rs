//! One engine connection: a TCP stream, its receive buffer, and a watchdog
//! timer.
//!
//! A `Connection` is only ever touched on the engine thread. Its async
//! transport tasks report through events, which the bridge feeds back in via
//! [`Connection::apply`]; the returned notification is what the engine sees.
//!
//! ```text
//!   Idle ──connect──▶ Connecting ──Connected──▶ Connected ──Closed──▶ Closed
//!                         │                                      ▲
//!                         └──────────ConnectFailed───────────────┘
//! ```
//!
//! `destroy` moves any state straight to `Closed`.

use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::byte_queue::ByteQueue;
use crate::codes::{NotifyKind, ReturnCode};
use crate::error::NetError;
use crate::event::TransportEvent;
use crate::registry::Handle;
use crate::transport::{SocketTask, Transport};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, `connect` not called yet.
    Idle,
    /// Connect attempt in flight.
    Connecting,
    /// Stream established.
    Connected,
    /// Connect failed, stream ended, or destroyed. Terminal.
    Closed,
}

/// The single armed watchdog of a connection.
#[derive(Debug)]
struct Timer {
    generation: u64,
    task: JoinHandle<()>,
}

/// Per-connection state owned by the registry.
#[derive(Debug)]
pub struct Connection {
    handle: Handle,
    state: ConnectionState,
    pending: ByteQueue,
    socket: Option<SocketTask>,
    timer: Option<Timer>,
    /// Bumped on every arm so stale expiries can be told apart.
    timer_generation: u64,
    /// Set once the connect attempt failed; no timer may be armed after that.
    connect_failed: bool,
}

impl Connection {
    /// Create an idle connection identified by `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            state: ConnectionState::Idle,
            pending: ByteQueue::new(),
            socket: None,
            timer: None,
            timer_generation: 0,
            connect_failed: false,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Bytes received and not yet drained by `recv`.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Whether a watchdog timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Start an asynchronous connect. The outcome arrives later as a
    /// `Connect` notification; this only reports whether the attempt was
    /// accepted.
    pub fn connect(&mut self, transport: &Transport, host: &str, port: u16) -> Result<(), NetError> {
        if self.state != ConnectionState::Idle {
            return Err(NetError::AlreadyConnecting);
        }
        tracing::debug!("Connection {} connecting to {host}:{port}", self.handle);
        self.socket = Some(transport.open(self.handle, host, port));
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Queue `data` for writing. Returns the number of bytes accepted.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, NetError> {
        if self.state != ConnectionState::Connected {
            return Err(NetError::NotConnected);
        }
        let socket = self.socket.as_ref().ok_or(NetError::NotConnected)?;
        socket.write(Bytes::copy_from_slice(data))?;
        Ok(data.len())
    }

    /// Copy buffered bytes into `dest` without waiting.
    ///
    /// Returns [`NetError::WouldBlock`] when nothing is buffered, so the
    /// engine can tell "no data yet" apart from a zero-length read.
    pub fn recv(&mut self, dest: &mut [u8]) -> Result<usize, NetError> {
        if self.pending.is_empty() {
            return Err(NetError::WouldBlock);
        }
        Ok(self.pending.drain_into(dest))
    }

    /// Arm the watchdog to fire once after `after`, replacing any armed timer
    /// without notifying for it. `None` disarms.
    ///
    /// Arming works in every state except after a failed connect, which is
    /// the last notification a connection may raise.
    pub fn set_timeout(
        &mut self,
        transport: &Transport,
        after: Option<Duration>,
    ) -> Result<(), NetError> {
        self.cancel_timer();
        let Some(after) = after else {
            return Ok(());
        };
        if self.connect_failed {
            return Err(NetError::NotConnected);
        }
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let task = transport.arm_timer(self.handle, generation, after);
        self.timer = Some(Timer { generation, task });
        Ok(())
    }

    /// Tear down: cancel the timer, drop the socket, forget buffered data.
    /// Safe to call in any state and more than once.
    pub fn destroy(&mut self) {
        self.cancel_timer();
        if let Some(socket) = self.socket.take() {
            socket.abort();
        }
        self.pending.clear();
        if self.state != ConnectionState::Closed {
            tracing::debug!("Connection {} destroyed", self.handle);
        }
        self.state = ConnectionState::Closed;
    }

    /// Fold a transport event into the connection and return the
    /// notification it raises, if any.
    pub fn apply(&mut self, event: TransportEvent) -> Option<(NotifyKind, ReturnCode)> {
        match event {
            TransportEvent::Connected if self.state == ConnectionState::Connecting => {
                self.state = ConnectionState::Connected;
                Some((NotifyKind::Connect, ReturnCode::Success))
            }
            TransportEvent::ConnectFailed(_) if self.state == ConnectionState::Connecting => {
                self.state = ConnectionState::Closed;
                self.socket = None;
                self.connect_failed = true;
                self.cancel_timer();
                Some((NotifyKind::Connect, ReturnCode::ConnectionError))
            }
            TransportEvent::Data(chunk) if self.state == ConnectionState::Connected => {
                self.pending.push(chunk);
                Some((NotifyKind::ReadReady, ReturnCode::Success))
            }
            TransportEvent::Closed if self.state == ConnectionState::Connected => {
                self.state = ConnectionState::Closed;
                self.socket = None;
                Some((NotifyKind::Disconnect, ReturnCode::Success))
            }
            TransportEvent::TimerExpired(generation)
                if self.timer.as_ref().is_some_and(|t| t.generation == generation) =>
            {
                self.timer = None;
                Some((NotifyKind::Timeout, ReturnCode::Success))
            }
            _ => None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> Connection {
        let mut connection = Connection::new(Handle(1));
        connection.state = ConnectionState::Connecting;
        assert_eq!(
            connection.apply(TransportEvent::Connected),
            Some((NotifyKind::Connect, ReturnCode::Success))
        );
        connection
    }

    #[test]
    fn test_new_connection_is_idle() {
        let connection = Connection::new(Handle(3));
        assert_eq!(connection.handle(), Handle(3));
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert_eq!(connection.buffered(), 0);
        assert!(!connection.timer_armed());
    }

    #[test]
    fn test_recv_empty_would_block() {
        let mut connection = Connection::new(Handle(1));
        let mut buf = [0u8; 8];
        assert!(matches!(
            connection.recv(&mut buf),
            Err(NetError::WouldBlock)
        ));
    }

    #[test]
    fn test_single_chunk_recv_drains_exactly() {
        let mut connection = connected();
        connection.apply(TransportEvent::Data(Bytes::from_static(b"abcde")));
        let mut buf = [0u8; 5];
        assert_eq!(connection.recv(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"abcde");
        assert_eq!(connection.buffered(), 0);
        assert!(matches!(
            connection.recv(&mut buf),
            Err(NetError::WouldBlock)
        ));
    }

    #[test]
    fn test_short_recv_continues_where_it_stopped() {
        let mut connection = connected();
        connection.apply(TransportEvent::Data(Bytes::from_static(b"0123456789")));
        let mut first = [0u8; 3];
        assert_eq!(connection.recv(&mut first).unwrap(), 3);
        assert_eq!(&first, b"012");
        let mut rest = [0u8; 16];
        assert_eq!(connection.recv(&mut rest).unwrap(), 7);
        assert_eq!(&rest[..7], b"3456789");
    }

    #[test]
    fn test_each_arrival_raises_read_ready() {
        let mut connection = connected();
        for chunk in [&b"abc"[..], b"de", b"f"] {
            assert_eq!(
                connection.apply(TransportEvent::Data(Bytes::copy_from_slice(chunk))),
                Some((NotifyKind::ReadReady, ReturnCode::Success))
            );
        }
        assert_eq!(connection.buffered(), 6);
    }

    #[test]
    fn test_connect_failure_closes() {
        let mut connection = Connection::new(Handle(1));
        connection.state = ConnectionState::Connecting;
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(
            connection.apply(TransportEvent::ConnectFailed(refused)),
            Some((NotifyKind::Connect, ReturnCode::ConnectionError))
        );
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.apply(TransportEvent::Closed), None);
    }

    #[test]
    fn test_close_notifies_once() {
        let mut connection = connected();
        assert_eq!(
            connection.apply(TransportEvent::Closed),
            Some((NotifyKind::Disconnect, ReturnCode::Success))
        );
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.apply(TransportEvent::Closed), None);
    }

    #[test]
    fn test_data_after_close_is_ignored() {
        let mut connection = connected();
        connection.apply(TransportEvent::Closed);
        assert_eq!(
            connection.apply(TransportEvent::Data(Bytes::from_static(b"late"))),
            None
        );
        assert_eq!(connection.buffered(), 0);
    }

    #[test]
    fn test_buffered_bytes_survive_disconnect() {
        let mut connection = connected();
        connection.apply(TransportEvent::Data(Bytes::from_static(b"bye")));
        connection.apply(TransportEvent::Closed);
        let mut buf = [0u8; 8];
        assert_eq!(connection.recv(&mut buf).unwrap(), 3);
    }

    #[test]
    fn test_send_when_not_connected_fails() {
        let mut connection = Connection::new(Handle(1));
        assert!(matches!(
            connection.send(b"hello"),
            Err(NetError::NotConnected)
        ));
    }

    #[test]
    fn test_unarmed_timer_expiry_is_ignored() {
        let mut connection = Connection::new(Handle(1));
        assert_eq!(connection.apply(TransportEvent::TimerExpired(1)), None);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut connection = connected();
        connection.apply(TransportEvent::Data(Bytes::from_static(b"xyz")));
        connection.destroy();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.buffered(), 0);
        connection.destroy();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(
            connection.apply(TransportEvent::Data(Bytes::from_static(b"again"))),
            None
        );
    }

    fn transport() -> (tokio::runtime::Runtime, Transport) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (events, _rx) = crate::event::channel();
        let transport = Transport::new(runtime.handle().clone(), events, Default::default());
        (runtime, transport)
    }

    #[test]
    fn test_timer_can_be_armed_after_disconnect() {
        let (_runtime, transport) = transport();
        let mut connection = connected();
        connection.apply(TransportEvent::Closed);
        connection
            .set_timeout(&transport, Some(Duration::from_secs(5)))
            .unwrap();
        assert!(connection.timer_armed());
        assert_eq!(
            connection.apply(TransportEvent::TimerExpired(1)),
            Some((NotifyKind::Timeout, ReturnCode::Success))
        );
    }

    #[test]
    fn test_timer_refused_after_failed_connect() {
        let (_runtime, transport) = transport();
        let mut connection = Connection::new(Handle(1));
        connection.state = ConnectionState::Connecting;
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        connection.apply(TransportEvent::ConnectFailed(refused));
        assert!(matches!(
            connection.set_timeout(&transport, Some(Duration::ZERO)),
            Err(NetError::NotConnected)
        ));
        assert!(!connection.timer_armed());
        connection.set_timeout(&transport, None).unwrap();
    }

    #[test]
    fn test_connect_twice_rejected() {
        let (_runtime, transport) = transport();
        let mut connection = Connection::new(Handle(1));
        connection.state = ConnectionState::Connected;
        assert!(matches!(
            connection.connect(&transport, "127.0.0.1", 1),
            Err(NetError::AlreadyConnecting)
        ));
    }
}
