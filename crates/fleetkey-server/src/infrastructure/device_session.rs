//! DeviceSession: one WebSocket connection to one device's HID injector.
//!
//! The injector is a fixed external peer: it accepts binary 9-byte keyboard
//! reports and occasionally emits a text banner at connect time. A session
//! owns the write half of the socket; a background reader task drains the
//! read half so protocol-level pings are answered and a close from the
//! device side is noticed promptly instead of on the next failed write.
//!
//! Connect failures are surfaced to the caller and never retried here —
//! retry policy belongs to whoever owns the fleet lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use async_trait::async_trait;
use fleetkey_core::KeyboardReport;

use crate::application::registry::SessionRegistry;
use crate::application::transport::{DeviceTransport, SendError};
use crate::domain::device::DeviceIdentity;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Errors establishing a device session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The handshake did not complete within the deadline.
    #[error("timed out connecting to {url} after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The endpoint refused or the WebSocket upgrade failed.
    #[error("websocket handshake with {url} failed")]
    Handshake {
        url: String,
        #[source]
        source: WsError,
    },
}

/// A live WebSocket session to one device's injector.
pub struct DeviceSession {
    serial: String,
    sink: tokio::sync::Mutex<WsSink>,
    alive: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl DeviceSession {
    /// Connects to the device's injector endpoint and starts the reader task.
    ///
    /// `registry` is held weakly by the reader so a device closing its end
    /// is reflected in the device list immediately; a dropped registry just
    /// means nobody is listening anymore.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Timeout`] if the handshake exceeds
    /// `connect_timeout` and [`ConnectError::Handshake`] if the endpoint is
    /// unreachable or rejects the upgrade.
    pub async fn connect(
        identity: &DeviceIdentity,
        connect_timeout: Duration,
        registry: Weak<SessionRegistry>,
    ) -> Result<Arc<Self>, ConnectError> {
        let url = identity.ws_url.clone();

        let handshake = timeout(connect_timeout, connect_async(url.as_str())).await;
        let (ws_stream, _response) = match handshake {
            Ok(Ok(ok)) => ok,
            Ok(Err(source)) => return Err(ConnectError::Handshake { url, source }),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    url,
                    timeout: connect_timeout,
                })
            }
        };

        info!("connected to device {} at {url}", identity.serial);

        let (sink, source) = ws_stream.split();
        let session = Arc::new(Self {
            serial: identity.serial.clone(),
            sink: tokio::sync::Mutex::new(sink),
            alive: AtomicBool::new(true),
            last_activity: Mutex::new(Instant::now()),
        });

        // The reader holds only weak handles: dropping the session (or the
        // registry) must not be kept alive by its own background task.
        tokio::spawn(run_reader(
            source,
            Arc::downgrade(&session),
            registry,
            identity.serial.clone(),
        ));

        Ok(session)
    }

    /// When the last successful send (or connect) happened.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap()
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

// Hand-written: the socket halves have no Debug representation worth printing.
impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("serial", &self.serial)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeviceTransport for DeviceSession {
    async fn send_report(&self, report: KeyboardReport) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }

        let mut sink = self.sink.lock().await;
        match sink.send(WsMessage::Binary(report.to_vec())).await {
            Ok(()) => {
                *self.last_activity.lock().unwrap() = Instant::now();
                Ok(())
            }
            Err(e) => {
                self.mark_dead();
                Err(SendError::Transport(e.to_string()))
            }
        }
    }

    async fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            let mut sink = self.sink.lock().await;
            // Best-effort close frame; the socket is going away regardless.
            if let Err(e) = sink.close().await {
                debug!("close frame to device {} failed: {e}", self.serial);
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Drains frames from the device until the connection ends, then flags the
/// session dead and tells the registry so the device list refreshes.
async fn run_reader(
    mut source: WsSource,
    session: Weak<DeviceSession>,
    registry: Weak<SessionRegistry>,
    serial: String,
) {
    while let Some(frame) = source.next().await {
        match frame {
            // Injectors greet with a human-readable banner.
            Ok(WsMessage::Text(text)) => debug!("device {serial}: {}", text.trim()),
            Ok(WsMessage::Binary(data)) => {
                debug!("device {serial}: unexpected {} byte frame ignored", data.len())
            }
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
            Ok(WsMessage::Close(_)) => {
                info!("device {serial} closed its session");
                break;
            }
            Err(e) => {
                warn!("device {serial} connection error: {e}");
                break;
            }
        }
    }

    if let Some(session) = session.upgrade() {
        session.mark_dead();
    }
    // refresh rather than mark_dead: this session already flagged itself,
    // and if a reconnect replaced it the successor must stay untouched.
    if let Some(registry) = registry.upgrade() {
        registry.refresh().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(ws_url: &str) -> DeviceIdentity {
        DeviceIdentity {
            serial: "dev-test".to_string(),
            name: "dev-test".to_string(),
            port: 1,
            ws_url: ws_url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_is_a_handshake_error() {
        // Nothing listens on port 1; the TCP connect is refused immediately.
        let result = DeviceSession::connect(
            &identity("ws://127.0.0.1:1"),
            Duration::from_secs(5),
            Weak::new(),
        )
        .await;

        match result {
            Err(ConnectError::Handshake { url, .. }) => {
                assert_eq!(url, "ws://127.0.0.1:1");
            }
            other => panic!("expected Handshake error, got {other:?}"),
        }
    }

    #[test]
    fn test_connect_error_messages_name_the_endpoint() {
        let err = ConnectError::Timeout {
            url: "ws://127.0.0.1:8886".to_string(),
            timeout: Duration::from_secs(10),
        };
        let text = err.to_string();
        assert!(text.contains("ws://127.0.0.1:8886"));
        assert!(text.contains("timed out"));
    }
}
