//! The transport seam between command routing and device I/O.
//!
//! The registry and router never touch a WebSocket directly; they hold
//! `Arc<dyn DeviceTransport>` handles. Production wires in the
//! tokio-tungstenite session from `infrastructure::device_session`; tests
//! wire in recording in-memory transports.

use async_trait::async_trait;
use thiserror::Error;

use fleetkey_core::KeyboardReport;

/// A report send that did not reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The session is already closed; nothing was written.
    #[error("device session is closed")]
    Closed,

    /// The underlying transport failed mid-write.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// One live connection to a device-side keyboard injector.
///
/// Implementations must be safe to share across tasks: the router fans a
/// broadcast out to every transport concurrently. `Debug` is required so
/// registry lookups and routing outcomes can be asserted on and logged.
#[async_trait]
pub trait DeviceTransport: Send + Sync + std::fmt::Debug {
    /// Delivers one keyboard report to the device.
    async fn send_report(&self, report: KeyboardReport) -> Result<(), SendError>;

    /// Closes the session. Idempotent; later sends return [`SendError::Closed`].
    async fn close(&self);

    /// Whether the session is believed to be alive.
    ///
    /// Liveness is advisory: a send can still fail after this returns `true`
    /// if the device drops the connection in between.
    fn is_alive(&self) -> bool;
}
