//! Device identity: the immutable facts about one managed device.

use fleetkey_core::DeviceEntry;

/// The identity of one Android device under management.
///
/// Captured when the device is configured (manifest or `--device` flag) and
/// never mutated afterwards; liveness is session state, not identity, and
/// lives in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable identifier (adb serial). Registry key and routing target.
    pub serial: String,
    /// Human-readable label shown to control clients.
    pub name: String,
    /// Forwarded local port the device's injector listens on.
    pub port: u16,
    /// Full WebSocket URL of the injector endpoint.
    pub ws_url: String,
}

impl DeviceIdentity {
    /// Builds the control-plane view of this device.
    pub fn entry(&self, connected: bool) -> DeviceEntry {
        DeviceEntry {
            serial: self.serial.clone(),
            name: self.name.clone(),
            port: self.port,
            ws_url: self.ws_url.clone(),
            connected,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_carries_identity_and_liveness() {
        let identity = DeviceIdentity {
            serial: "R58M123ABC".to_string(),
            name: "Pixel-3ABC".to_string(),
            port: 8886,
            ws_url: "ws://127.0.0.1:8886".to_string(),
        };

        let entry = identity.entry(true);
        assert_eq!(entry.serial, "R58M123ABC");
        assert_eq!(entry.name, "Pixel-3ABC");
        assert_eq!(entry.port, 8886);
        assert_eq!(entry.ws_url, "ws://127.0.0.1:8886");
        assert!(entry.connected);

        assert!(!identity.entry(false).connected);
    }
}
