//! Server configuration and the fleet manifest.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from CLI arguments (see `main.rs`) and then
//! shared across tasks; nothing in the domain or application layers reads
//! environment variables or files at runtime.
//!
//! [`FleetManifest`] is the optional TOML file describing the devices to
//! connect to at startup:
//!
//! ```toml
//! [[devices]]
//! serial = "R58M123ABC"
//! name = "rack-phone-1"
//! port = 8886
//!
//! [[devices]]
//! serial = "emulator-5554"
//! host = "10.0.0.7"
//! port = 8887
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::device::DeviceIdentity;

/// Errors raised while loading the fleet manifest.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file could not be read.
    #[error("failed to read fleet manifest {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file is not valid TOML or has the wrong shape.
    #[error("failed to parse fleet manifest")]
    Parse(#[from] toml::de::Error),
}

/// All runtime configuration for the server.
///
/// Build once at startup, wrap in an `Arc`, and share across session tasks.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the control-plane WebSocket listener binds to.
    ///
    /// `0.0.0.0` accepts control clients from any interface; use
    /// `127.0.0.1` to restrict to local clients.
    pub control_bind_addr: SocketAddr,

    /// Maximum time to wait for a device WebSocket handshake to complete.
    pub connect_timeout: Duration,

    /// Maximum time to wait for one report send to a device before the
    /// target is declared dead for that dispatch.
    pub send_timeout: Duration,

    /// How long a key stays pressed between the press and release reports.
    pub key_hold: Duration,

    /// Pause between consecutive characters when typing a text string.
    pub char_interval: Duration,
}

impl Default for ServerConfig {
    /// Defaults suitable for a local fleet with adb-forwarded ports.
    ///
    /// | Field           | Default        |
    /// |-----------------|----------------|
    /// | control_bind    | `0.0.0.0:7777` |
    /// | connect_timeout | 10 seconds     |
    /// | send_timeout    | 3 seconds      |
    /// | key_hold        | 50 ms          |
    /// | char_interval   | 100 ms         |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address string.
            control_bind_addr: "0.0.0.0:7777".parse().unwrap(),
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(3),
            key_hold: Duration::from_millis(50),
            char_interval: Duration::from_millis(100),
        }
    }
}

// ── Fleet manifest ────────────────────────────────────────────────────────────

/// One device entry in the fleet manifest file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceManifestEntry {
    /// Stable device identifier (adb serial).
    pub serial: String,

    /// Optional display name; defaults to the serial when omitted.
    #[serde(default)]
    pub name: Option<String>,

    /// Injector host; defaults to `127.0.0.1` (adb-forwarded port).
    #[serde(default)]
    pub host: Option<String>,

    /// Forwarded local port the injector listens on.
    pub port: u16,
}

/// The parsed fleet manifest: the devices to connect to at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetManifest {
    #[serde(default)]
    pub devices: Vec<DeviceManifestEntry>,
}

impl FleetManifest {
    /// Loads and parses the manifest from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if the contents are not a valid manifest.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses manifest text. Split out from [`Self::load`] for tests.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolves every manifest entry into a full [`DeviceIdentity`].
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        self.devices
            .iter()
            .map(|entry| {
                let host = entry.host.as_deref().unwrap_or("127.0.0.1");
                DeviceIdentity {
                    serial: entry.serial.clone(),
                    name: entry.name.clone().unwrap_or_else(|| entry.serial.clone()),
                    port: entry.port,
                    ws_url: format!("ws://{host}:{}", entry.port),
                }
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
