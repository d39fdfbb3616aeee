//! # fleetkey-server
//!
//! The FleetKey server process: holds one WebSocket session per Android
//! device's keyboard injector, and one WebSocket control plane for browser
//! clients that want to type on those devices.
//!
//! # Architecture
//!
//! ```text
//! Browser / control client  (JSON over WebSocket, port 7777)
//!       ↕
//! fleetkey-server  ← this process
//!   domain/          DeviceIdentity, ServerConfig, fleet manifest
//!   application/     SessionRegistry, CommandRouter, DeviceTransport seam
//!   infrastructure/  control gateway listener, device WebSocket sessions
//!       ↕
//! per-device injector  (binary 9-byte reports over WebSocket, ports 8886+)
//! ```
//!
//! The layering rule: `domain` knows nothing about sockets, `application`
//! talks to devices only through the [`application::DeviceTransport`] trait,
//! and `infrastructure` owns all tokio-tungstenite plumbing. That seam is
//! what lets the registry and router tests run with in-memory transports.

pub mod application;
pub mod domain;
pub mod infrastructure;
