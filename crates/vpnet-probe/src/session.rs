//! Engine-side reaction to bridge notifications.
//!
//! Written against [`NetDriver`] only, the way the native engine sees the
//! bridge: integer returns, negative codes for errors.

use vpnet_bridge::{Handle, NetDriver, Notification, NotifyKind, ReturnCode};

/// What the host loop should do after a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop with this process exit code.
    Exit(i32),
}

/// One universe connection driven by the probe.
pub struct Session {
    handle: Handle,
    idle_timeout_seconds: i32,
    payload: Option<Vec<u8>>,
    /// Total bytes drained so far.
    received: usize,
}

impl Session {
    pub fn new(handle: Handle, idle_timeout_seconds: i32, payload: Option<Vec<u8>>) -> Self {
        Self {
            handle,
            idle_timeout_seconds,
            payload,
            received: 0,
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    /// Handle one notification for this session.
    pub fn on_notify(&mut self, net: &mut impl NetDriver, notification: Notification) -> Flow {
        if notification.handle != self.handle {
            return Flow::Continue;
        }
        match notification.kind {
            NotifyKind::Connect if notification.code == ReturnCode::Success.as_raw() => {
                tracing::info!("Connected (handle {})", self.handle);
                net.timeout(self.handle, self.idle_timeout_seconds);
                match self.payload.take() {
                    Some(payload) => self.send(net, &payload),
                    None => Flow::Continue,
                }
            }
            NotifyKind::Connect => {
                tracing::error!("Connect failed with code {}", notification.code);
                Flow::Exit(1)
            }
            NotifyKind::ReadReady => {
                self.drain(net);
                // Any traffic resets the idle watchdog.
                net.timeout(self.handle, self.idle_timeout_seconds);
                Flow::Continue
            }
            NotifyKind::Disconnect => {
                tracing::info!("Disconnected after {} bytes", self.received);
                Flow::Exit(0)
            }
            NotifyKind::Timeout => {
                tracing::warn!("Idle for {}s, giving up", self.idle_timeout_seconds);
                Flow::Exit(2)
            }
            NotifyKind::WriteReady => Flow::Continue,
        }
    }

    fn send(&mut self, net: &mut impl NetDriver, payload: &[u8]) -> Flow {
        let rc = net.send(self.handle, payload);
        if rc < 0 {
            tracing::error!("Send failed with code {rc}");
            return Flow::Exit(1);
        }
        tracing::debug!("Sent {rc} bytes");
        Flow::Continue
    }

    /// Read until the bridge reports nothing left.
    fn drain(&mut self, net: &mut impl NetDriver) {
        let mut buf = [0u8; 4096];
        loop {
            let rc = net.recv(self.handle, &mut buf);
            let Ok(n) = usize::try_from(rc) else {
                break;
            };
            if n == 0 {
                break;
            }
            self.received += n;
            println!("{}", String::from_utf8_lossy(&buf[..n]));
        }
    }
}
