//! End-to-end wire-contract tests: from a control-plane JSON frame down to
//! the exact device-plane bytes.
//!
//! These tests cross module boundaries on purpose — the key table, the
//! report encoder, and the JSON protocol each have their own unit tests,
//! but the injector only ever sees their composition. If any of the three
//! drifts, the byte sequences asserted here are what breaks on real
//! devices.

use fleetkey_core::{
    usage_for_char, usage_for_name, ControlRequest, KeyboardReport, ModifierSet, REPORT_LEN,
};

/// Resolves a keyboard request the way the server does and returns the full
/// press/release byte pair.
fn keystroke_bytes(json: &str) -> (Vec<u8>, Vec<u8>) {
    let request: ControlRequest = serde_json::from_str(json).expect("valid request");
    let (key, modifiers) = match request {
        ControlRequest::Keyboard { key, modifiers, .. } => (key, modifiers),
        other => panic!("expected keyboard request, got {other:?}"),
    };
    let usage = usage_for_name(&key).expect("known key");
    (
        KeyboardReport::press(usage, modifiers).to_vec(),
        KeyboardReport::release(modifiers).to_vec(),
    )
}

#[test]
fn test_ctrl_enter_frame_produces_documented_bytes() {
    let (press, release) = keystroke_bytes(
        r#"{"type":"keyboard","device":"dev-1","key":"ENTER","modifiers":{"ctrl":true}}"#,
    );

    assert_eq!(press, vec![100, 0x01, 0, 0x28, 0, 0, 0, 0, 0]);
    assert_eq!(release, vec![100, 0x01, 0, 0x00, 0, 0, 0, 0, 0]);
}

#[test]
fn test_plain_letter_frame_has_empty_mask() {
    let (press, release) =
        keystroke_bytes(r#"{"type":"keyboard","device":"broadcast","key":"a"}"#);

    assert_eq!(press, vec![100, 0, 0, 0x04, 0, 0, 0, 0, 0]);
    assert_eq!(release, vec![100, 0, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_text_request_realizes_as_ordered_press_release_pairs() {
    let request: ControlRequest =
        serde_json::from_str(r#"{"type":"text","device":"dev-1","text":"OK 1"}"#).unwrap();
    let text = match request {
        ControlRequest::Text { text, .. } => text,
        other => panic!("expected text request, got {other:?}"),
    };

    let no_mods = ModifierSet::default();
    let mut reports = Vec::new();
    for c in text.chars() {
        let usage = usage_for_char(c).expect("mappable character");
        reports.push(KeyboardReport::press(usage, no_mods));
        reports.push(KeyboardReport::release(no_mods));
    }

    let usages: Vec<u8> = reports.iter().map(|r| r.usage()).collect();
    // O, release, K, release, space, release, 1, release.
    assert_eq!(usages, [0x12, 0, 0x0E, 0, 0x2C, 0, 0x1E, 0]);
    assert!(reports.iter().all(|r| r.as_bytes().len() == REPORT_LEN));
    assert!(reports.iter().all(|r| r.as_bytes()[0] == 100));
}
