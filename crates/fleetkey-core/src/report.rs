//! The UHID keyboard report: the 9-byte binary frame the device-side
//! injector consumes.
//!
//! Wire layout (frozen contract, byte-exact):
//!
//! ```text
//! byte 0     message type (100 = keyboard report)
//! byte 1     modifier bitmask (bit0 ctrl, bit1 shift, bit2 alt, bit3 gui)
//! byte 2     reserved, always 0
//! byte 3     HID usage code of the active key (0 = none)
//! bytes 4..8 reserved key slots, always 0
//! ```
//!
//! Only single-key-at-a-time injection is modeled: one usage code per
//! report, the six extra key slots stay zero. A logical keystroke is two
//! reports — press (byte 3 = usage) then release (byte 3 = 0) — carrying
//! the same modifier mask on both.

use serde::{Deserialize, Serialize};

/// Device-plane message type for a keyboard report.
pub const REPORT_TYPE_KEYBOARD: u8 = 100;

/// Total size of a keyboard report in bytes.
pub const REPORT_LEN: usize = 9;

// ── Modifier set ──────────────────────────────────────────────────────────────

/// The set of modifier keys held during a keystroke.
///
/// Serializes to/from the control-plane JSON shape
/// `{"ctrl":bool,"shift":bool,"alt":bool,"gui":bool}`; absent fields
/// default to `false`, so clients may omit `gui` (or everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierSet {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub gui: bool,
}

impl ModifierSet {
    pub const CTRL: u8 = 1 << 0;
    pub const SHIFT: u8 = 1 << 1;
    pub const ALT: u8 = 1 << 2;
    pub const GUI: u8 = 1 << 3;

    /// Packs the set into the injector's modifier bitmask.
    ///
    /// Bit positions are a frozen wire contract; the set is
    /// order-independent by construction.
    pub fn mask(self) -> u8 {
        let mut mask = 0u8;
        if self.ctrl {
            mask |= Self::CTRL;
        }
        if self.shift {
            mask |= Self::SHIFT;
        }
        if self.alt {
            mask |= Self::ALT;
        }
        if self.gui {
            mask |= Self::GUI;
        }
        mask
    }

    /// Unpacks a modifier bitmask. Bits above bit 3 are ignored.
    pub fn from_mask(mask: u8) -> Self {
        Self {
            ctrl: mask & Self::CTRL != 0,
            shift: mask & Self::SHIFT != 0,
            alt: mask & Self::ALT != 0,
            gui: mask & Self::GUI != 0,
        }
    }

    /// Returns `true` if no modifier is held.
    pub fn is_empty(self) -> bool {
        self.mask() == 0
    }
}

// ── Keyboard report ───────────────────────────────────────────────────────────

/// One encoded keyboard report, always exactly [`REPORT_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardReport([u8; REPORT_LEN]);

impl KeyboardReport {
    /// Encodes a key-down report for `usage` with the given modifiers.
    pub fn press(usage: u8, modifiers: ModifierSet) -> Self {
        let mut bytes = [0u8; REPORT_LEN];
        bytes[0] = REPORT_TYPE_KEYBOARD;
        bytes[1] = modifiers.mask();
        bytes[3] = usage;
        // bytes[2] and bytes[4..=8] stay 0: reserved by the wire contract.
        Self(bytes)
    }

    /// Encodes the key-up report that clears the active key.
    ///
    /// Carries the same modifier mask as the matching press; the injector
    /// has no separate repeat state, so every press must be paired with one
    /// of these.
    pub fn release(modifiers: ModifierSet) -> Self {
        Self::press(0, modifiers)
    }

    /// The raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    /// The wire bytes as an owned buffer, ready for a binary frame.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// The usage code carried in this report (0 for a release).
    pub fn usage(&self) -> u8 {
        self.0[3]
    }

    /// The modifier mask carried in this report.
    pub fn modifier_mask(&self) -> u8 {
        self.0[1]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
