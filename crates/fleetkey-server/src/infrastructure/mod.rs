//! Infrastructure layer: all real WebSocket I/O.
//!
//! - [`device_session`] — outbound sessions to device-side injectors.
//! - [`gateway`] — the inbound control-plane listener for browser clients.

pub mod device_session;
pub mod gateway;

pub use device_session::{ConnectError, DeviceSession};
pub use gateway::{run_gateway, run_gateway_on};
