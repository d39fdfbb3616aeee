//! # fleetkey-core
//!
//! Shared library for FleetKey containing the key-name lookup table, the
//! UHID keyboard report encoder, and the control-plane message types.
//!
//! This crate is used by the server and by any embedding control client.
//! It has zero dependencies on OS APIs or network sockets.
//!
//! FleetKey drives the on-screen keyboard of one or many Android devices by
//! emulating a USB-HID keyboard through a device-mirroring server's input
//! channel. This crate defines:
//!
//! - **`keymap`** – The fixed mapping from symbolic key names ("ENTER",
//!   "A", "PAGE_UP") to USB HID usage codes on the keyboard/keypad page.
//!
//! - **`report`** – The 9-byte binary keyboard report the device-side
//!   injector expects, plus the modifier bitmask packing. The byte layout
//!   is a frozen wire contract.
//!
//! - **`protocol`** – The JSON messages exchanged with control clients
//!   (browsers or any WebSocket client) over the control plane.

pub mod keymap;
pub mod protocol;
pub mod report;

// Re-export the most-used types at the crate root so callers can write
// `fleetkey_core::KeyboardReport` instead of the full module path.
pub use keymap::{usage_for_char, usage_for_name, UnknownKey};
pub use protocol::{ControlPush, ControlRequest, DeviceEntry, BROADCAST_DEVICE};
pub use report::{KeyboardReport, ModifierSet, REPORT_LEN, REPORT_TYPE_KEYBOARD};
