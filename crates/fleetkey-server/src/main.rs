//! FleetKey server — entry point.
//!
//! Connects to the keyboard injector on every configured Android device and
//! serves a WebSocket control plane for browsers to type on them, one device
//! at a time or all at once.
//!
//! # Usage
//!
//! ```text
//! fleetkey-server [OPTIONS]
//!
//! Options:
//!   --control-port <PORT>        Control-plane WebSocket port [default: 7777]
//!   --control-bind <ADDR>        Control-plane bind address [default: 0.0.0.0]
//!   --fleet <PATH>               TOML fleet manifest to load devices from
//!   --device <SERIAL=[HOST:]PORT>  Ad-hoc device (repeatable)
//!   --connect-timeout <SECS>     Device handshake deadline [default: 10]
//!   --send-timeout <SECS>        Per-report send deadline [default: 3]
//!   --key-hold-ms <MS>           Press-to-release hold time [default: 50]
//!   --char-interval-ms <MS>      Pause between text characters [default: 100]
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set via environment variable; CLI args win when
//! both are present.
//!
//! | Variable                    | Default   |
//! |-----------------------------|-----------|
//! | `FLEETKEY_CONTROL_PORT`     | `7777`    |
//! | `FLEETKEY_CONTROL_BIND`     | `0.0.0.0` |
//! | `FLEETKEY_FLEET`            | unset     |
//! | `FLEETKEY_CONNECT_TIMEOUT`  | `10`      |
//! | `FLEETKEY_SEND_TIMEOUT`     | `3`       |
//! | `FLEETKEY_KEY_HOLD_MS`      | `50`      |
//! | `FLEETKEY_CHAR_INTERVAL_MS` | `100`     |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetkey_server::application::{CommandRouter, RouterConfig, SessionRegistry};
use fleetkey_server::domain::{DeviceIdentity, FleetManifest, ServerConfig};
use fleetkey_server::infrastructure::{run_gateway, DeviceSession};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-device Android HID keyboard control server.
///
/// Holds one WebSocket session per device-side keyboard injector and routes
/// control-plane commands (single keys or text) to one device or to all of
/// them.
#[derive(Debug, Parser)]
#[command(
    name = "fleetkey-server",
    about = "Multi-device Android HID keyboard control server",
    version
)]
struct Cli {
    /// TCP port for the control-plane WebSocket listener.
    #[arg(long, default_value_t = 7777, env = "FLEETKEY_CONTROL_PORT")]
    control_port: u16,

    /// Address to bind the control-plane listener to.
    ///
    /// Use `0.0.0.0` to accept control clients from any interface, or
    /// `127.0.0.1` for local-only access.
    #[arg(long, default_value = "0.0.0.0", env = "FLEETKEY_CONTROL_BIND")]
    control_bind: String,

    /// Path to a TOML fleet manifest listing devices to connect at startup.
    #[arg(long, env = "FLEETKEY_FLEET")]
    fleet: Option<PathBuf>,

    /// Ad-hoc device in `SERIAL=PORT` or `SERIAL=HOST:PORT` form.
    ///
    /// The host defaults to `127.0.0.1` (an adb-forwarded port). May be
    /// given multiple times; combines with `--fleet`.
    #[arg(long = "device", value_name = "SERIAL=[HOST:]PORT")]
    devices: Vec<String>,

    /// Device WebSocket handshake deadline in seconds.
    #[arg(long, default_value_t = 10, env = "FLEETKEY_CONNECT_TIMEOUT")]
    connect_timeout: u64,

    /// Per-report send deadline in seconds; an overrun marks that device dead.
    #[arg(long, default_value_t = 3, env = "FLEETKEY_SEND_TIMEOUT")]
    send_timeout: u64,

    /// How long a key stays pressed, in milliseconds.
    #[arg(long, default_value_t = 50, env = "FLEETKEY_KEY_HOLD_MS")]
    key_hold_ms: u64,

    /// Pause between consecutive text characters, in milliseconds.
    #[arg(long, default_value_t = 100, env = "FLEETKEY_CHAR_INTERVAL_MS")]
    char_interval_ms: u64,
}

impl Cli {
    /// Converts the parsed arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--control-bind` is not a valid IP address.
    fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let control_bind_addr: SocketAddr =
            format!("{}:{}", self.control_bind, self.control_port)
                .parse()
                .with_context(|| {
                    format!(
                        "invalid control bind address: '{}:{}'",
                        self.control_bind, self.control_port
                    )
                })?;

        Ok(ServerConfig {
            control_bind_addr,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            send_timeout: Duration::from_secs(self.send_timeout),
            key_hold: Duration::from_millis(self.key_hold_ms),
            char_interval: Duration::from_millis(self.char_interval_ms),
        })
    }

    /// Resolves the full device list: manifest entries first, then `--device`
    /// flags.
    fn device_identities(&self) -> anyhow::Result<Vec<DeviceIdentity>> {
        let mut identities = Vec::new();

        if let Some(path) = &self.fleet {
            let manifest = FleetManifest::load(path)
                .with_context(|| format!("failed to load fleet manifest {path:?}"))?;
            identities.extend(manifest.identities());
        }

        for arg in &self.devices {
            identities.push(parse_device_arg(arg)?);
        }

        Ok(identities)
    }
}

/// Parses one `--device` argument: `SERIAL=PORT` or `SERIAL=HOST:PORT`.
fn parse_device_arg(arg: &str) -> anyhow::Result<DeviceIdentity> {
    let (serial, endpoint) = arg
        .split_once('=')
        .with_context(|| format!("invalid --device '{arg}': expected SERIAL=[HOST:]PORT"))?;

    if serial.is_empty() {
        anyhow::bail!("invalid --device '{arg}': empty serial");
    }

    let (host, port_str) = match endpoint.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => ("127.0.0.1", endpoint),
    };

    let port: u16 = port_str
        .parse()
        .with_context(|| format!("invalid --device '{arg}': bad port '{port_str}'"))?;

    Ok(DeviceIdentity {
        serial: serial.to_string(),
        name: serial.to_string(),
        port,
        ws_url: format!("ws://{host}:{port}"),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level comes from RUST_LOG, falling back to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.to_server_config()?;
    let identities = cli.device_identities()?;

    info!(
        "fleetkey-server starting — control={}, devices={}",
        config.control_bind_addr,
        identities.len()
    );

    // Graceful shutdown: Ctrl+C clears the flag, the accept loop checks it
    // every 200 ms and exits cleanly.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C: {e}");
            }
        }
    });

    let registry = Arc::new(SessionRegistry::new());

    // Connect every configured device. A device that is down at startup is
    // skipped with a warning; it never takes the server down.
    for identity in identities {
        let serial = identity.serial.clone();
        match DeviceSession::connect(
            &identity,
            config.connect_timeout,
            Arc::downgrade(&registry),
        )
        .await
        {
            Ok(session) => registry.add(identity, session).await,
            Err(e) => warn!("skipping device {serial}: {e:#}"),
        }
    }

    let router = Arc::new(CommandRouter::new(
        Arc::clone(&registry),
        RouterConfig {
            send_timeout: config.send_timeout,
            key_hold: config.key_hold,
            char_interval: config.char_interval,
        },
    ));

    run_gateway(&config, registry, router, running).await?;

    info!("fleetkey-server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
