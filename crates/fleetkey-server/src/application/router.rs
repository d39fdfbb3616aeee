//! CommandRouter: turns one control command into keyboard reports on one or
//! many devices.
//!
//! The router owns the keystroke semantics:
//!
//! - A key command is a press report, a hold pause, and a release report
//!   carrying the same modifier mask.
//! - A text command is that pair per character, in source order, with a
//!   pause between characters. Characters outside the key table are skipped
//!   individually and reported, never aborting the rest of the text.
//!
//! # Fan-out and failure scoping
//!
//! Broadcast targets are driven concurrently, one future per device, joined
//! before the router returns: the caller always gets a complete per-target
//! outcome list. One device failing (or timing out) never blocks or cancels
//! the others; it only marks that device's session dead. Per-device report
//! order is preserved by driving each device's steps sequentially inside its
//! own future; there is deliberately no ordering between devices.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use fleetkey_core::keymap::UnknownKey;
use fleetkey_core::{usage_for_char, usage_for_name, KeyboardReport, ModifierSet, BROADCAST_DEVICE};

use crate::application::registry::SessionRegistry;
use crate::application::transport::{DeviceTransport, SendError};

// ── Commands ──────────────────────────────────────────────────────────────────

/// Where a command is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// One specific device, by serial.
    Device(String),
    /// Every currently alive device session.
    Broadcast,
}

impl CommandTarget {
    /// Parses the wire `device` field: the broadcast sentinel or a serial.
    pub fn parse(device: &str) -> Self {
        if device == BROADCAST_DEVICE {
            Self::Broadcast
        } else {
            Self::Device(device.to_string())
        }
    }
}

/// One routable command, already validated at the JSON layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// One logical keystroke: press + release of a named key.
    SendKey {
        target: CommandTarget,
        key: String,
        modifiers: ModifierSet,
    },
    /// Type a string character by character.
    SendText { target: CommandTarget, text: String },
}

// ── Results ───────────────────────────────────────────────────────────────────

/// A command that could not be routed at all (no reports were sent).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The key name of a key command is not in the key table.
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),
}

/// Why delivery to one target failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The target serial is not in the registry, or its session is dead.
    #[error("device not found or not connected")]
    DeviceNotFound,

    /// A report write failed mid-delivery.
    #[error(transparent)]
    Send(#[from] SendError),

    /// A report send did not complete within the configured timeout.
    #[error("send timed out")]
    Timeout,
}

/// What was delivered to one target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delivery {
    /// Reports written to the device (press and release each count as one).
    pub reports_sent: usize,
    /// Text characters skipped because they have no key-table entry.
    pub skipped: Vec<char>,
}

/// The outcome of one command for one targeted device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub serial: String,
    pub outcome: Result<Delivery, DispatchError>,
}

/// Per-target outcomes for one dispatched command.
///
/// Broadcast to an empty fleet is a valid, successful result with zero
/// outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingResult {
    pub outcomes: Vec<TargetOutcome>,
}

impl RoutingResult {
    /// Serials that received the full report sequence.
    pub fn successes(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_ok())
    }

    /// Serials where delivery failed.
    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_err())
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Timing knobs for keystroke realization and delivery.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-report send deadline; an overrun fails that target only.
    pub send_timeout: Duration,
    /// Pause between a press report and its release report.
    pub key_hold: Duration,
    /// Pause between consecutive characters of a text command.
    pub char_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(3),
            key_hold: Duration::from_millis(50),
            char_interval: Duration::from_millis(100),
        }
    }
}

/// One step of a keystroke plan: a report plus the pause that follows it.
#[derive(Debug, Clone, Copy)]
struct Step {
    report: KeyboardReport,
    pause_after: Duration,
}

/// The realized report sequence for one command, shared by every target.
#[derive(Debug, Clone, Default)]
struct KeystrokePlan {
    steps: Vec<Step>,
    skipped: Vec<char>,
}

/// Routes commands to device sessions via the registry.
pub struct CommandRouter {
    registry: Arc<SessionRegistry>,
    config: RouterConfig,
}

impl CommandRouter {
    pub fn new(registry: Arc<SessionRegistry>, config: RouterConfig) -> Self {
        Self { registry, config }
    }

    /// Dispatches one command and waits for every per-target outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::UnknownKey`] when a key command names a key
    /// outside the table — nothing is sent to any device in that case.
    /// Every other failure is per-target and lands in the
    /// [`RoutingResult`].
    pub async fn dispatch(&self, command: Command) -> Result<RoutingResult, RouteError> {
        let (target, plan) = match command {
            Command::SendKey {
                target,
                key,
                modifiers,
            } => (target, self.plan_key(&key, modifiers)?),
            Command::SendText { target, text } => (target, self.plan_text(&text)),
        };

        let targets = match target {
            CommandTarget::Device(serial) => match self.registry.get(&serial).await {
                Ok(transport) => vec![(serial, transport)],
                Err(_) => {
                    // The whole command has exactly one target; report the
                    // miss as that target's outcome rather than an error.
                    return Ok(RoutingResult {
                        outcomes: vec![TargetOutcome {
                            serial,
                            outcome: Err(DispatchError::DeviceNotFound),
                        }],
                    });
                }
            },
            CommandTarget::Broadcast => self.registry.broadcast_targets().await,
        };

        if targets.is_empty() {
            debug!("broadcast with no alive sessions; nothing to do");
            return Ok(RoutingResult::default());
        }

        // One future per device, joined so the aggregate result is complete.
        let deliveries = targets.into_iter().map(|(serial, transport)| {
            let plan = plan.clone();
            async move {
                let outcome = self.deliver(&serial, transport, &plan).await;
                TargetOutcome { serial, outcome }
            }
        });

        Ok(RoutingResult {
            outcomes: join_all(deliveries).await,
        })
    }

    /// Plan for a single named keystroke: press, hold, release.
    fn plan_key(&self, key: &str, modifiers: ModifierSet) -> Result<KeystrokePlan, RouteError> {
        let usage = usage_for_name(key)?;
        Ok(KeystrokePlan {
            steps: vec![
                Step {
                    report: KeyboardReport::press(usage, modifiers),
                    pause_after: self.config.key_hold,
                },
                Step {
                    report: KeyboardReport::release(modifiers),
                    pause_after: Duration::ZERO,
                },
            ],
            skipped: Vec::new(),
        })
    }

    /// Plan for a text command: a press/release pair per mapped character.
    ///
    /// Unmapped characters are recorded in `skipped` and do not interrupt
    /// the rest of the text.
    fn plan_text(&self, text: &str) -> KeystrokePlan {
        let mut plan = KeystrokePlan::default();
        let no_mods = ModifierSet::default();

        for c in text.chars() {
            let usage = match usage_for_char(c) {
                Ok(usage) => usage,
                Err(_) => {
                    plan.skipped.push(c);
                    continue;
                }
            };

            // Pause between characters, not after the last release.
            if let Some(last) = plan.steps.last_mut() {
                last.pause_after = self.config.char_interval;
            }
            plan.steps.push(Step {
                report: KeyboardReport::press(usage, no_mods),
                pause_after: self.config.key_hold,
            });
            plan.steps.push(Step {
                report: KeyboardReport::release(no_mods),
                pause_after: Duration::ZERO,
            });
        }

        plan
    }

    /// Drives one target through the plan sequentially.
    ///
    /// Stops at the first failed or timed-out send and marks the session
    /// dead; the partial count is discarded in favor of the error.
    async fn deliver(
        &self,
        serial: &str,
        transport: Arc<dyn DeviceTransport>,
        plan: &KeystrokePlan,
    ) -> Result<Delivery, DispatchError> {
        let mut reports_sent = 0usize;

        for step in &plan.steps {
            let send = transport.send_report(step.report);
            match timeout(self.config.send_timeout, send).await {
                Ok(Ok(())) => reports_sent += 1,
                Ok(Err(e)) => {
                    warn!("send to device {serial} failed: {e}");
                    self.registry.mark_dead(serial, &transport).await;
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("send to device {serial} timed out");
                    self.registry.mark_dead(serial, &transport).await;
                    return Err(DispatchError::Timeout);
                }
            }

            if !step.pause_after.is_zero() {
                sleep(step.pause_after).await;
            }
        }

        Ok(Delivery {
            reports_sent,
            skipped: plan.skipped.clone(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
