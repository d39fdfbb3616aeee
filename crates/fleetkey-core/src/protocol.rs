//! JSON message types for the control-plane WebSocket protocol.
//!
//! Control clients (a browser panel or any WebSocket client) speak JSON text
//! frames; the device plane speaks the binary report format in [`crate::report`].
//! This module is the control-plane half of the wire contract.
//!
//! # Message flow
//!
//! ```text
//! Client → Server: JSON text frame  →  ControlRequest
//! Server → Client: ControlPush      →  JSON text frame
//! ```
//!
//! Every message is a JSON object with a lowercase `"type"` discriminant,
//! handled by serde's `#[serde(tag = "type")]`:
//!
//! ```json
//! {"type":"keyboard","device":"broadcast","key":"ENTER","modifiers":{"ctrl":true}}
//! {"type":"devices","devices":[{"serial":"R58M...","name":"Pixel-58M1","port":8886,"ws_url":"ws://127.0.0.1:8886","connected":true}]}
//! ```
//!
//! Requests and pushes are distinct enums so it is a compile-time error to
//! send a server-only message from a client, and vice versa.
//!
//! Field names in this module are frozen: renaming one breaks every deployed
//! control panel.

use serde::{Deserialize, Serialize};

use crate::report::ModifierSet;

/// Routing sentinel meaning "all currently alive device sessions".
pub const BROADCAST_DEVICE: &str = "broadcast";

// ── Client → Server requests ──────────────────────────────────────────────────

/// All messages a control client can send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Inject one logical keystroke (press + release) on the target device(s).
    Keyboard {
        /// Device serial, or [`BROADCAST_DEVICE`] for every alive device.
        device: String,
        /// Symbolic key name resolved through the key table ("A", "ENTER", ...).
        key: String,
        /// Modifier keys held for the keystroke; omitted fields are `false`.
        #[serde(default)]
        modifiers: ModifierSet,
    },

    /// Type a text string character by character on the target device(s).
    ///
    /// Characters without a key-table entry are skipped individually; the
    /// rest of the text is still delivered.
    Text {
        /// Device serial, or [`BROADCAST_DEVICE`].
        device: String,
        /// The text to type, in source order.
        text: String,
    },

    /// Ask for an immediate device-list push.
    ///
    /// The server also pushes the list unsolicited on every registry change;
    /// this exists for clients that want to re-sync on demand.
    GetDevices,
}

// ── Server → Client pushes ────────────────────────────────────────────────────

/// All messages the server can push to a control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPush {
    /// The current device list.
    ///
    /// Sent once when a control client connects, after every registry change
    /// (device added, removed, or liveness flipped), and in reply to
    /// [`ControlRequest::GetDevices`].
    Devices { devices: Vec<DeviceEntry> },

    /// A malformed or unroutable command was rejected.
    ///
    /// Scoped to the originating connection only; the session stays open and
    /// subsequent well-formed commands are processed normally.
    Error { message: String },
}

/// One device as reported in a [`ControlPush::Devices`] push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Stable device identifier (adb serial).
    pub serial: String,
    /// Human-readable label assigned at discovery time.
    pub name: String,
    /// Forwarded local port the device's injector listens on.
    pub port: u16,
    /// WebSocket endpoint of the device's injector.
    pub ws_url: String,
    /// Whether the server currently holds a live session to this device.
    pub connected: bool,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_request_deserializes_from_the_documented_shape() {
        // Arrange: exactly what a control panel sends
        let json = r#"{
            "type": "keyboard",
            "device": "R58M123ABC",
            "key": "ENTER",
            "modifiers": {"ctrl": true, "shift": false, "alt": false}
        }"#;

        // Act
        let msg: ControlRequest = serde_json::from_str(json).unwrap();

        // Assert
        match msg {
            ControlRequest::Keyboard { device, key, modifiers } => {
                assert_eq!(device, "R58M123ABC");
                assert_eq!(key, "ENTER");
                assert!(modifiers.ctrl);
                assert!(!modifiers.shift && !modifiers.alt && !modifiers.gui);
            }
            other => panic!("expected Keyboard, got {other:?}"),
        }
    }

    #[test]
    fn test_keyboard_request_modifiers_are_optional() {
        let json = r#"{"type":"keyboard","device":"broadcast","key":"TAB"}"#;
        let msg: ControlRequest = serde_json::from_str(json).unwrap();
        match msg {
            ControlRequest::Keyboard { device, modifiers, .. } => {
                assert_eq!(device, BROADCAST_DEVICE);
                assert!(modifiers.is_empty());
            }
            other => panic!("expected Keyboard, got {other:?}"),
        }
    }

    #[test]
    fn test_text_request_round_trips() {
        let original = ControlRequest::Text {
            device: "broadcast".to_string(),
            text: "HELLO WORLD".to_string(),
        };
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains(r#""type":"text""#));
        let decoded: ControlRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_get_devices_uses_snake_case_discriminant() {
        let json = serde_json::to_string(&ControlRequest::GetDevices).unwrap();
        assert_eq!(json, r#"{"type":"get_devices"}"#);
    }

    #[test]
    fn test_devices_push_serializes_the_frozen_field_names() {
        let push = ControlPush::Devices {
            devices: vec![DeviceEntry {
                serial: "emulator-5554".to_string(),
                name: "SM-G991B-5554".to_string(),
                port: 8886,
                ws_url: "ws://127.0.0.1:8886".to_string(),
                connected: true,
            }],
        };

        let json = serde_json::to_string(&push).unwrap();

        // Every field name is part of the wire contract.
        for field in [
            r#""type":"devices""#,
            r#""serial":"emulator-5554""#,
            r#""name":"SM-G991B-5554""#,
            r#""port":8886"#,
            r#""ws_url":"ws://127.0.0.1:8886""#,
            r#""connected":true"#,
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn test_error_push_round_trips() {
        let original = ControlPush::Error {
            message: "bad command: missing field `key`".to_string(),
        };
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains(r#""type":"error""#));
        let decoded: ControlPush = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_missing_type_field_is_a_deserialization_error() {
        let json = r#"{"device":"broadcast","key":"ENTER"}"#;
        let result: Result<ControlRequest, _> = serde_json::from_str(json);
        assert!(result.is_err(), "missing 'type' must not deserialize");
    }

    #[test]
    fn test_unknown_type_is_a_deserialization_error() {
        let json = r#"{"type":"mouse","device":"broadcast"}"#;
        let result: Result<ControlRequest, _> = serde_json::from_str(json);
        assert!(result.is_err(), "unknown 'type' must not deserialize");
    }
}
