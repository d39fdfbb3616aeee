//! Symbolic key names → USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! Control clients address keys by name ("ENTER", "A", "PAGE_UP"); the
//! device-side injector wants HID usage codes. This module is the single
//! translation point between the two.
//!
//! The table is deliberately closed: it covers letters A–Z, digits 0–9, and
//! a fixed set of named control/navigation keys. A name outside that set is
//! an [`UnknownKey`] failure at the API boundary — never a silent default —
//! so a typo in a control frame can only ever drop that one key.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page
//! 0x07). Note that HID codes for letters start at 0x04, not at ASCII 'A':
//! they identify physical key positions, not characters.

use thiserror::Error;

/// Lookup failure: the key name is not in the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key name: {name:?}")]
pub struct UnknownKey {
    /// The name as received, before case folding.
    pub name: String,
}

/// Resolves a symbolic key name to its HID usage code.
///
/// Matching is case-insensitive. Recognized names:
///
/// - single letters `A`–`Z` (HID 0x04–0x1D)
/// - single digits `0`–`9` (HID 0x1E–0x27)
/// - `TAB`, `ENTER`, `ESCAPE`, `BACKSPACE`, `SPACE`, `DELETE`, `HOME`,
///   `END`, `PAGE_UP`, `PAGE_DOWN`, `UP`, `DOWN`, `LEFT`, `RIGHT`
///
/// # Errors
///
/// Returns [`UnknownKey`] for any name outside the enumerated set.
pub fn usage_for_name(name: &str) -> Result<u8, UnknownKey> {
    let upper = name.to_ascii_uppercase();

    // Single-character names are letters or digits.
    let mut chars = upper.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return usage_for_char(c).map_err(|_| UnknownKey {
            name: name.to_string(),
        });
    }

    let usage = match upper.as_str() {
        "TAB" => 0x2B,
        "ENTER" => 0x28,
        "ESCAPE" => 0x29,
        "BACKSPACE" => 0x2A,
        "SPACE" => 0x2C,
        "DELETE" => 0x4C,
        "HOME" => 0x4A,
        "END" => 0x4D,
        "PAGE_UP" => 0x4B,
        "PAGE_DOWN" => 0x4E,
        "UP" => 0x52,
        "DOWN" => 0x51,
        "LEFT" => 0x50,
        "RIGHT" => 0x4F,
        _ => {
            return Err(UnknownKey {
                name: name.to_string(),
            })
        }
    };
    Ok(usage)
}

/// Resolves a single text character to its HID usage code.
///
/// Used by the router when realizing a text command as a sequence of
/// keystrokes: letters fold to upper case, `' '` maps to SPACE.
///
/// # Errors
///
/// Returns [`UnknownKey`] for characters with no table entry (punctuation,
/// non-ASCII). Callers skip such characters rather than aborting the text.
pub fn usage_for_char(c: char) -> Result<u8, UnknownKey> {
    match c {
        ' ' => Ok(0x2C),
        'a'..='z' => Ok(0x04 + (c as u8 - b'a')),
        'A'..='Z' => Ok(0x04 + (c as u8 - b'A')),
        '1'..='9' => Ok(0x1E + (c as u8 - b'1')),
        '0' => Ok(0x27),
        _ => Err(UnknownKey { name: c.to_string() }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
