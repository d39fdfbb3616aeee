//! ControlGateway: WebSocket listener for control clients.
//!
//! Each control client (a browser panel or any WebSocket client) gets its
//! own session task that:
//!
//! 1. Completes the WebSocket upgrade.
//! 2. Pushes the current device list immediately.
//! 3. Loops over two event sources with `tokio::select!`:
//!    - registry change notifications → push the refreshed device list;
//!    - inbound frames → parse JSON into a command and dispatch it.
//!
//! A malformed frame earns that client an error push and nothing else: the
//! session stays open and later well-formed commands work normally. Closing
//! a control session never touches in-flight device sends — those belong to
//! the router future, which is awaited before the next frame is read.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use fleetkey_core::{ControlPush, ControlRequest};

use crate::application::registry::SessionRegistry;
use crate::application::router::{Command, CommandRouter, CommandTarget, RoutingResult};
use crate::domain::config::ServerConfig;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the control-plane listener and runs the accept loop until
/// `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound; the caller treats that
/// as fatal (a control plane nobody can reach is not a server).
pub async fn run_gateway(
    config: &ServerConfig,
    registry: Arc<SessionRegistry>,
    router: Arc<CommandRouter>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.control_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind control listener on {}",
                config.control_bind_addr
            )
        })?;

    info!("control gateway listening on {}", config.control_bind_addr);
    run_gateway_on(listener, registry, router, running).await;
    Ok(())
}

/// Accept loop over an already-bound listener.
///
/// Split out from [`run_gateway`] so tests can bind port 0 themselves and
/// learn the ephemeral port before connecting.
pub async fn run_gateway_on(
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    router: Arc<CommandRouter>,
    running: Arc<AtomicBool>,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping control accept loop");
            break;
        }

        // Short accept timeout so the shutdown flag is checked even when no
        // clients are connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("control client connected from {peer_addr}");
                let registry = Arc::clone(&registry);
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    handle_control_session(stream, peer_addr, registry, router).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep serving other clients.
                error!("control accept error: {e}");
            }
            Err(_) => {
                // No connection attempt in the last 200 ms.
            }
        }
    }
}

// ── Per-client session ────────────────────────────────────────────────────────

/// Wraps [`run_control_session`] so errors are logged once per session.
async fn handle_control_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    router: Arc<CommandRouter>,
) {
    match run_control_session(stream, peer_addr, registry, router).await {
        Ok(()) => info!("control session {peer_addr} closed"),
        Err(e) => warn!("control session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_control_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    router: Arc<CommandRouter>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("websocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut devices_rx = registry.subscribe();

    // Every client starts with a full device list. Taking the snapshot via
    // borrow_and_update also clears the change flag, so a registry change
    // landing between subscribe and this push is not delivered twice or
    // swallowed.
    let initial = ControlPush::Devices {
        devices: devices_rx.borrow_and_update().clone(),
    };
    send_push(&mut ws_tx, &initial).await?;

    loop {
        tokio::select! {
            changed = devices_rx.changed() => {
                if changed.is_err() {
                    // Registry dropped; the server is shutting down.
                    break;
                }
                let push = ControlPush::Devices {
                    devices: devices_rx.borrow_and_update().clone(),
                };
                send_push(&mut ws_tx, &push).await?;
            }

            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!("control session {peer_addr}: read error: {e}");
                        break;
                    }
                    None => break,
                };

                match msg {
                    WsMessage::Text(json) => {
                        let request: ControlRequest = match serde_json::from_str(&json) {
                            Ok(r) => r,
                            Err(e) => {
                                // One bad frame must not cost the client its
                                // session.
                                warn!("control session {peer_addr}: bad command: {e}");
                                let push = ControlPush::Error {
                                    message: format!("bad command: {e}"),
                                };
                                send_push(&mut ws_tx, &push).await?;
                                continue;
                            }
                        };

                        debug!(
                            "control session {peer_addr}: {} request",
                            request_type_name(&request)
                        );

                        handle_request(request, &registry, &router, &mut ws_tx, peer_addr)
                            .await?;
                    }

                    WsMessage::Binary(_) => {
                        // The control plane is JSON-only; tell the client
                        // rather than dropping the frame silently.
                        warn!("control session {peer_addr}: binary frame rejected");
                        let push = ControlPush::Error {
                            message: "bad command: binary frames are not supported".to_string(),
                        };
                        send_push(&mut ws_tx, &push).await?;
                    }

                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}

                    WsMessage::Close(_) => {
                        debug!("control session {peer_addr}: close frame");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Executes one parsed request and reports routing problems back to the
/// originating client only.
async fn handle_request(
    request: ControlRequest,
    registry: &Arc<SessionRegistry>,
    router: &Arc<CommandRouter>,
    ws_tx: &mut (impl Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    peer_addr: SocketAddr,
) -> anyhow::Result<()> {
    let command = match request {
        ControlRequest::GetDevices => {
            let push = ControlPush::Devices {
                devices: registry.list().await,
            };
            return send_push(ws_tx, &push).await;
        }
        ControlRequest::Keyboard {
            device,
            key,
            modifiers,
        } => Command::SendKey {
            target: CommandTarget::parse(&device),
            key,
            modifiers,
        },
        ControlRequest::Text { device, text } => Command::SendText {
            target: CommandTarget::parse(&device),
            text,
        },
    };

    match router.dispatch(command).await {
        Ok(result) => log_dispatch(peer_addr, &result),
        Err(e) => {
            let push = ControlPush::Error {
                message: e.to_string(),
            };
            send_push(ws_tx, &push).await?;
        }
    }

    Ok(())
}

fn log_dispatch(peer_addr: SocketAddr, result: &RoutingResult) {
    let failures = result.failures().count();
    if failures > 0 {
        warn!(
            "control session {peer_addr}: command reached {} device(s), failed on {failures}",
            result.successes().count()
        );
    } else {
        debug!(
            "control session {peer_addr}: command reached {} device(s)",
            result.outcomes.len()
        );
    }
}

async fn send_push(
    ws_tx: &mut (impl Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    push: &ControlPush,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(push).context("failed to serialize push")?;
    ws_tx
        .send(WsMessage::Text(json))
        .await
        .context("failed to send push to control client")?;
    Ok(())
}

// ── Helper ────────────────────────────────────────────────────────────────────

/// Short type-name string for a request, for log lines.
fn request_type_name(request: &ControlRequest) -> &'static str {
    match request {
        ControlRequest::Keyboard { .. } => "keyboard",
        ControlRequest::Text { .. } => "text",
        ControlRequest::GetDevices => "get_devices",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fleetkey_core::ModifierSet;

    #[test]
    fn test_request_type_name_keyboard() {
        let request = ControlRequest::Keyboard {
            device: "broadcast".to_string(),
            key: "ENTER".to_string(),
            modifiers: ModifierSet::default(),
        };
        assert_eq!(request_type_name(&request), "keyboard");
    }

    #[test]
    fn test_request_type_name_text() {
        let request = ControlRequest::Text {
            device: "dev-1".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(request_type_name(&request), "text");
    }

    #[test]
    fn test_request_type_name_get_devices() {
        assert_eq!(request_type_name(&ControlRequest::GetDevices), "get_devices");
    }
}
