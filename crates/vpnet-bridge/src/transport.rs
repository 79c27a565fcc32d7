//! Async side of a connection: connect, read loop, write loop, timers.
//!
//! Every task here runs on the bridge's tokio runtime and reports back only
//! through [`EventSender`]. Tasks are cancelled by aborting their
//! [`JoinHandle`], which drops the socket halves they own.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::BridgeSettings;
use crate::error::NetError;
use crate::event::{EventSender, TransportEvent};
use crate::registry::Handle;

/// Spawns transport tasks for every connection of one bridge.
pub struct Transport {
    runtime: RuntimeHandle,
    events: EventSender,
    settings: BridgeSettings,
}

impl Transport {
    pub fn new(runtime: RuntimeHandle, events: EventSender, settings: BridgeSettings) -> Self {
        Self {
            runtime,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Start connecting to `host:port` in the background.
    ///
    /// Exactly one of `Connected` / `ConnectFailed` is posted for `handle`,
    /// followed after a successful connect by any number of `Data` events and
    /// at most one `Closed`.
    pub fn open(&self, handle: Handle, host: &str, port: u16) -> SocketTask {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = self.runtime.spawn(drive(
            handle,
            host.to_string(),
            port,
            self.settings.clone(),
            self.events.clone(),
            outbound_rx,
        ));
        SocketTask {
            outbound: outbound_tx,
            task,
        }
    }

    /// Post `TimerExpired(generation)` for `handle` once `after` elapses.
    pub fn arm_timer(&self, handle: Handle, generation: u64, after: Duration) -> JoinHandle<()> {
        let events = self.events.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            events.post(handle, TransportEvent::TimerExpired(generation));
        })
    }
}

/// Engine-side handle to a running connection task.
#[derive(Debug)]
pub struct SocketTask {
    outbound: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

impl SocketTask {
    /// Queue bytes for the writer. Fails once the task has finished.
    pub fn write(&self, data: Bytes) -> Result<(), NetError> {
        self.outbound.send(data).map_err(|_| NetError::NotConnected)
    }

    /// Abandon the task. Does not wait for it.
    pub fn abort(self) {
        self.task.abort();
    }
}

/// Why the established stream stopped.
enum StreamEnd {
    /// Peer sent FIN.
    Eof,
    Error(io::Error),
    /// The engine dropped its side; nobody is listening any more.
    Abandoned,
}

async fn drive(
    handle: Handle,
    host: String,
    port: u16,
    settings: BridgeSettings,
    events: EventSender,
    outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    let stream = match connect(&host, port, settings.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!("Connection {handle} to {host}:{port} failed: {e}");
            events.post(handle, TransportEvent::ConnectFailed(e));
            return;
        }
    };

    if settings.nodelay
        && let Err(e) = stream.set_nodelay(true)
    {
        tracing::debug!("Connection {handle}: could not set TCP_NODELAY: {e}");
    }

    tracing::debug!("Connection {handle} established to {host}:{port}");
    events.post(handle, TransportEvent::Connected);

    let (reader, writer) = stream.into_split();
    let end = tokio::select! {
        end = read_loop(handle, reader, settings.read_buffer_size, &events) => end,
        end = write_loop(writer, outbound) => end,
    };

    match end {
        StreamEnd::Eof => tracing::debug!("Connection {handle} closed by peer"),
        StreamEnd::Error(e) => tracing::debug!("Connection {handle} lost: {e}"),
        StreamEnd::Abandoned => return,
    }
    events.post(handle, TransportEvent::Closed);
}

async fn connect(host: &str, port: u16, limit: Option<Duration>) -> io::Result<TcpStream> {
    within(limit, TcpStream::connect((host, port))).await
}

/// Await a connect attempt, failing with `TimedOut` once `limit` passes.
async fn within<T>(
    limit: Option<Duration>,
    attempt: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
        None => attempt.await,
    }
}

/// Post one `Data` event per completed read.
async fn read_loop(
    handle: Handle,
    mut reader: OwnedReadHalf,
    buffer_size: usize,
    events: &EventSender,
) -> StreamEnd {
    let buffer_size = buffer_size.max(1);
    let mut buf = BytesMut::with_capacity(buffer_size);
    loop {
        buf.reserve(buffer_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) => return StreamEnd::Eof,
            Ok(n) => {
                tracing::trace!("Connection {handle} received {n} bytes");
                events.post(handle, TransportEvent::Data(buf.split().freeze()));
            }
            Err(e) => return StreamEnd::Error(e),
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) -> StreamEnd {
    while let Some(chunk) = outbound.recv().await {
        if let Err(e) = writer.write_all(&chunk).await {
            return StreamEnd::Error(e);
        }
    }
    StreamEnd::Abandoned
}
