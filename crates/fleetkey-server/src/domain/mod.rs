//! Domain layer: device identity and server configuration.
//!
//! Plain data types with no I/O. The manifest loader in [`config`] touches
//! the filesystem but nothing here opens a socket.

pub mod config;
pub mod device;

pub use config::{ConfigError, FleetManifest, ServerConfig};
pub use device::DeviceIdentity;
