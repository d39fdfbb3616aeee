//! SessionRegistry: the live table of device sessions.
//!
//! The registry is the single authority on which devices exist and which are
//! currently reachable. Everything that cares about membership changes —
//! chiefly the control gateway, which pushes a fresh device list to every
//! browser — subscribes to the registry's watch channel instead of polling.
//!
//! # Liveness model
//!
//! A device entry stays in the registry after its session dies; it is listed
//! with `connected: false` until it is removed or a reconnect replaces the
//! session. Routing, however, only ever targets alive sessions: [`get`] and
//! [`broadcast_targets`] filter dead transports out.
//!
//! [`get`]: SessionRegistry::get
//! [`broadcast_targets`]: SessionRegistry::broadcast_targets

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use fleetkey_core::DeviceEntry;

use crate::application::transport::DeviceTransport;
use crate::domain::device::DeviceIdentity;

/// Errors raised when resolving a routing target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No alive session exists for this serial.
    #[error("no connected device with serial {serial:?}")]
    NotFound { serial: String },
}

struct SessionEntry {
    identity: DeviceIdentity,
    transport: Arc<dyn DeviceTransport>,
}

/// Shared, task-safe registry of device sessions.
///
/// Cheap to clone conceptually: callers hold it behind an `Arc` and every
/// method takes `&self`. Reads (routing lookups) vastly outnumber writes
/// (connect/disconnect), hence the `RwLock`.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    devices_tx: watch::Sender<Vec<DeviceEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (devices_tx, _) = watch::channel(Vec::new());
        Self {
            sessions: RwLock::new(HashMap::new()),
            devices_tx,
        }
    }

    /// Inserts a session for `identity`, replacing any previous session for
    /// the same serial.
    ///
    /// A replaced session is closed so its reader task winds down; the
    /// device list is re-published either way.
    pub async fn add(&self, identity: DeviceIdentity, transport: Arc<dyn DeviceTransport>) {
        let serial = identity.serial.clone();
        let previous = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                serial.clone(),
                SessionEntry {
                    identity,
                    transport,
                },
            )
        };

        if let Some(old) = previous {
            warn!("replacing existing session for device {serial}");
            old.transport.close().await;
        } else {
            info!("device {serial} registered");
        }

        self.publish().await;
    }

    /// Removes a device entirely. Idempotent: removing an unknown serial is
    /// a no-op and publishes nothing.
    pub async fn remove(&self, serial: &str) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(serial)
        };

        if let Some(entry) = removed {
            info!("device {serial} removed");
            entry.transport.close().await;
            self.publish().await;
        }
    }

    /// Resolves a single-device routing target.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the serial is unknown **or**
    /// its session is dead — a command must never be queued for a device
    /// that cannot receive it.
    pub async fn get(&self, serial: &str) -> Result<Arc<dyn DeviceTransport>, RegistryError> {
        let sessions = self.sessions.read().await;
        match sessions.get(serial) {
            Some(entry) if entry.transport.is_alive() => Ok(Arc::clone(&entry.transport)),
            _ => Err(RegistryError::NotFound {
                serial: serial.to_string(),
            }),
        }
    }

    /// Every alive session, for broadcast fan-out.
    ///
    /// Dead sessions are skipped silently; a broadcast to an empty fleet is
    /// the caller's edge case to report.
    pub async fn broadcast_targets(&self) -> Vec<(String, Arc<dyn DeviceTransport>)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .filter(|(_, entry)| entry.transport.is_alive())
            .map(|(serial, entry)| (serial.clone(), Arc::clone(&entry.transport)))
            .collect()
    }

    /// Snapshot of every known device, sorted by serial for stable output.
    pub async fn list(&self) -> Vec<DeviceEntry> {
        let sessions = self.sessions.read().await;
        let mut entries: Vec<DeviceEntry> = sessions
            .values()
            .map(|entry| entry.identity.entry(entry.transport.is_alive()))
            .collect();
        entries.sort_by(|a, b| a.serial.cmp(&b.serial));
        entries
    }

    /// Marks a device's session dead after a delivery failure.
    ///
    /// `failed` is the transport the failure was observed on. If a reconnect
    /// replaced the session while the delivery was in flight, only the stale
    /// transport is closed and the registered successor is left alone. The
    /// entry stays listed (with `connected: false` while dead) so operators
    /// can see the device went away; the refreshed list is pushed to
    /// subscribers. Publishing happens even when the transport already
    /// flagged itself dead — the failure may be the first observable sign
    /// of it.
    pub async fn mark_dead(&self, serial: &str, failed: &Arc<dyn DeviceTransport>) {
        let registered = {
            let sessions = self.sessions.read().await;
            sessions.get(serial).map(|e| Arc::clone(&e.transport))
        };

        match registered {
            Some(current) if Arc::ptr_eq(&current, failed) => {
                if current.is_alive() {
                    warn!("marking device {serial} dead");
                    current.close().await;
                } else {
                    debug!("device {serial} already dead");
                }
            }
            _ => {
                // The failure belongs to a transport that is no longer
                // registered; closing the current session would take down
                // a healthy reconnect.
                debug!("device {serial}: failed transport is not the registered session");
                failed.close().await;
            }
        }

        self.publish().await;
    }

    /// Re-publishes the device list after an out-of-band liveness change.
    ///
    /// Used by session readers that notice the device closed its end: the
    /// session has already flagged itself dead, only the list needs pushing.
    /// Unlike [`mark_dead`] this never closes anything.
    ///
    /// [`mark_dead`]: SessionRegistry::mark_dead
    pub async fn refresh(&self) {
        self.publish().await;
    }

    /// Subscribes to device-list changes.
    ///
    /// The receiver always holds the latest snapshot; `changed()` resolves
    /// whenever [`add`], [`remove`], or [`mark_dead`] republish.
    ///
    /// [`add`]: SessionRegistry::add
    /// [`remove`]: SessionRegistry::remove
    /// [`mark_dead`]: SessionRegistry::mark_dead
    pub fn subscribe(&self) -> watch::Receiver<Vec<DeviceEntry>> {
        self.devices_tx.subscribe()
    }

    async fn publish(&self) {
        // Skip the notification when nothing visible changed, so redundant
        // mark_dead/refresh calls do not spam control clients.
        let snapshot = self.list().await;
        self.devices_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use fleetkey_core::KeyboardReport;

    use crate::application::transport::SendError;

    /// In-memory transport that tracks liveness and close calls.
    #[derive(Debug)]
    struct FakeTransport {
        alive: AtomicBool,
        closed: AtomicBool,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                alive: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl DeviceTransport for FakeTransport {
        async fn send_report(&self, _report: KeyboardReport) -> Result<(), SendError> {
            if self.is_alive() {
                Ok(())
            } else {
                Err(SendError::Closed)
            }
        }

        async fn close(&self) {
            self.alive.store(false, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    fn identity(serial: &str, port: u16) -> DeviceIdentity {
        DeviceIdentity {
            serial: serial.to_string(),
            name: format!("device-{serial}"),
            port,
            ws_url: format!("ws://127.0.0.1:{port}"),
        }
    }

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.list().await.is_empty());
        assert!(registry.broadcast_targets().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_makes_device_routable_and_listed() {
        let registry = SessionRegistry::new();
        registry.add(identity("dev-1", 8886), FakeTransport::new()).await;

        assert!(registry.get("dev-1").await.is_ok());
        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].serial, "dev-1");
        assert!(list[0].connected);
    }

    #[tokio::test]
    async fn test_get_unknown_serial_is_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get("ghost").await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotFound {
                serial: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_get_dead_session_is_not_found() {
        let registry = SessionRegistry::new();
        let transport = FakeTransport::new();
        registry.add(identity("dev-1", 8886), transport.clone()).await;

        transport.close().await;

        assert!(registry.get("dev-1").await.is_err());
        // Still listed, just disconnected.
        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert!(!list[0].connected);
    }

    #[tokio::test]
    async fn test_add_replaces_and_closes_previous_session() {
        let registry = SessionRegistry::new();
        let first = FakeTransport::new();
        registry.add(identity("dev-1", 8886), first.clone()).await;

        let second = FakeTransport::new();
        registry.add(identity("dev-1", 8886), second).await;

        assert!(first.closed.load(Ordering::SeqCst));
        // The new session serves the serial.
        assert!(registry.get("dev-1").await.is_ok());
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let transport = FakeTransport::new();
        registry.add(identity("dev-1", 8886), transport.clone()).await;

        registry.remove("dev-1").await;
        registry.remove("dev-1").await;

        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_targets_skip_dead_sessions() {
        let registry = SessionRegistry::new();
        let alive = FakeTransport::new();
        let dead = FakeTransport::new();
        registry.add(identity("dev-1", 8886), alive).await;
        registry.add(identity("dev-2", 8887), dead.clone()).await;

        dead.close().await;

        let targets = registry.broadcast_targets().await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, "dev-1");
    }

    #[tokio::test]
    async fn test_mark_dead_keeps_entry_but_blocks_routing() {
        let registry = SessionRegistry::new();
        let transport = FakeTransport::new();
        registry.add(identity("dev-1", 8886), transport.clone()).await;

        let failed: Arc<dyn DeviceTransport> = transport.clone();
        registry.mark_dead("dev-1", &failed).await;

        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(registry.get("dev-1").await.is_err());
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_dead_on_a_replaced_session_spares_the_successor() {
        let registry = SessionRegistry::new();
        let stale = FakeTransport::new();
        registry.add(identity("dev-1", 8886), stale.clone()).await;

        // A reconnect replaces the session while a delivery on the old
        // transport is still in flight.
        let replacement = FakeTransport::new();
        registry.add(identity("dev-1", 8886), replacement.clone()).await;

        let failed: Arc<dyn DeviceTransport> = stale.clone();
        registry.mark_dead("dev-1", &failed).await;

        assert!(replacement.is_alive());
        assert!(!replacement.closed.load(Ordering::SeqCst));
        assert!(registry.get("dev-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribers_see_every_membership_change() {
        let registry = SessionRegistry::new();
        let mut rx = registry.subscribe();
        assert!(rx.borrow().is_empty());

        registry.add(identity("dev-1", 8886), FakeTransport::new()).await;
        rx.changed().await.unwrap();
        {
            let snapshot = rx.borrow_and_update();
            assert_eq!(snapshot.len(), 1);
            assert!(snapshot[0].connected);
        }

        let failed = registry.get("dev-1").await.unwrap();
        registry.mark_dead("dev-1", &failed).await;
        rx.changed().await.unwrap();
        {
            let snapshot = rx.borrow_and_update();
            assert_eq!(snapshot.len(), 1);
            assert!(!snapshot[0].connected);
        }

        registry.remove("dev-1").await;
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_publishes_out_of_band_liveness_changes() {
        let registry = SessionRegistry::new();
        let transport = FakeTransport::new();
        registry.add(identity("dev-1", 8886), transport.clone()).await;
        let mut rx = registry.subscribe();
        rx.borrow_and_update();

        // The session flags itself dead (its reader saw the device close);
        // only a refresh makes that visible to subscribers.
        transport.close().await;
        registry.refresh().await;

        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update()[0].connected);

        // A refresh with nothing new stays silent.
        registry.refresh().await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_serial() {
        let registry = SessionRegistry::new();
        registry.add(identity("zzz", 8888), FakeTransport::new()).await;
        registry.add(identity("aaa", 8886), FakeTransport::new()).await;
        registry.add(identity("mmm", 8887), FakeTransport::new()).await;

        let serials: Vec<String> =
            registry.list().await.into_iter().map(|e| e.serial).collect();
        assert_eq!(serials, ["aaa", "mmm", "zzz"]);
    }
}
