//! Rate-limited command queue.
//!
//! All AI control output funnels through here. The queue validates and
//! safety-clamps values, deduplicates against the last known receiver state,
//! honors pilot overrides, and meters execution:
//!
//! - Non-axis commands queue FIFO (newer collapses older of the same kind)
//!   and execute at most once per rate-limit interval (default 500 ms).
//! - Axis commands bypass the queue entirely; each axis kind has its own
//!   50 ms floor between sends, and is logged only when the rounded value
//!   changes or on a 2 s heartbeat.
//!
//! The queue never retries a failed send; the next tick re-asserts whatever
//! still matters.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::{Command, CommandFamily, CommandKind, CommandValue, OverrideAxis, Priority, WireCommand};
use crate::profile::AircraftProfile;

/// Minimum interval between non-axis executions.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(500);

/// Minimum interval between sends of the same axis kind.
const AXIS_MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Heartbeat interval for logging a held axis value.
const AXIS_LOG_HEARTBEAT: Duration = Duration::from_secs(2);

/// Default pilot-override duration.
pub const DEFAULT_OVERRIDE_DURATION: Duration = Duration::from_secs(30);

/// Hard cap on queued non-axis commands.
const QUEUE_CAP: usize = 50;

/// Bound on the retained execution log.
const LOG_CAP: usize = 50;

/// Dedup tolerance for scalar setpoints.
const SETPOINT_DEDUP_TOLERANCE: f64 = 1.0;

/// Errors from the bridge transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bridge is not connected.
    #[error("bridge transport unavailable")]
    Unavailable,

    /// The bridge rejected the event.
    #[error("bridge rejected event {event}: {reason}")]
    Rejected {
        /// Event name that was rejected.
        event: String,
        /// Bridge-reported reason.
        reason: String,
    },
}

/// Outbound transport to the simulator bridge.
pub trait CommandSink: Send {
    /// Dispatch one wire command.
    fn send(&mut self, wire: &WireCommand) -> Result<(), TransportError>;
}

/// Sink that drops everything; stands in when no bridge is attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl CommandSink for NullSink {
    fn send(&mut self, _wire: &WireCommand) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Safety clamps applied during validation, derived from the profile.
#[derive(Debug, Clone, Copy)]
pub struct SafetyClamps {
    /// Vertical-speed setpoint floor, fpm.
    pub min_vs_fpm: f64,
    /// Vertical-speed setpoint ceiling, fpm.
    pub max_vs_fpm: f64,
    /// Altitude setpoint ceiling, feet.
    pub max_alt_ft: f64,
    /// Speed setpoint floor, knots.
    pub min_spd_kt: f64,
    /// Speed setpoint ceiling, knots.
    pub max_spd_kt: f64,
}

impl SafetyClamps {
    /// Derive the clamp table from an aircraft profile.
    pub fn from_profile(profile: &AircraftProfile) -> Self {
        Self {
            min_vs_fpm: profile.limits.min_vs_fpm,
            max_vs_fpm: profile.limits.max_vs_fpm,
            max_alt_ft: profile.limits.ceiling_ft.max(45_000.0),
            min_spd_kt: profile.speeds.vs1.max(50.0),
            max_spd_kt: profile.speeds.vno.min(250.0),
        }
    }

    /// Clamp a value for the given kind. Returns the value and whether it
    /// was changed.
    fn apply(&self, kind: CommandKind, value: f64) -> (f64, bool) {
        let clamped = match kind {
            CommandKind::ApVsVarSet => value.clamp(self.min_vs_fpm, self.max_vs_fpm),
            CommandKind::ApAltVarSet => value.clamp(0.0, self.max_alt_ft),
            CommandKind::ApSpdVarSet => value.clamp(self.min_spd_kt, self.max_spd_kt),
            CommandKind::ThrottleSet | CommandKind::MixtureSet => value.clamp(0.0, 100.0),
            CommandKind::AxisElevatorSet => value.clamp(-80.0, 80.0),
            _ => value,
        };
        (clamped, clamped != value)
    }
}

/// One executed command as retained in the bounded log.
#[derive(Debug, Clone)]
pub struct CommandLogEntry {
    /// Command kind.
    pub kind: CommandKind,
    /// Wire event name.
    pub event: &'static str,
    /// Value sent, if any.
    pub value: Option<f64>,
    /// Description (possibly annotated "(clamped)").
    pub description: String,
    /// When it executed.
    pub executed_at: Instant,
}

/// An unexpired pilot override.
#[derive(Debug, Clone, Copy)]
pub struct ActiveOverride {
    /// Overridden axis.
    pub axis: OverrideAxis,
    /// Time remaining.
    pub remaining: Duration,
}

/// Observability counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Commands executed.
    pub executed: u64,
    /// Dropped in validation.
    pub dropped_invalid: u64,
    /// Dropped by an active pilot override.
    pub dropped_override: u64,
    /// Dropped by dedup against known receiver state.
    pub dropped_dedup: u64,
    /// Dropped because the transport failed.
    pub dropped_transport: u64,
    /// Oldest entries evicted on overflow.
    pub overflow_evictions: u64,
}

/// Callbacks fired by the queue.
#[derive(Default)]
pub struct QueueCallbacks {
    /// Fired after each successful execution.
    pub on_command_executed: Option<Box<dyn FnMut(&CommandLogEntry) + Send>>,
    /// Fired when the set of active overrides changes.
    pub on_override_change: Option<Box<dyn FnMut(&[ActiveOverride]) + Send>>,
}

impl std::fmt::Debug for QueueCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueCallbacks")
            .field("on_command_executed", &self.on_command_executed.is_some())
            .field("on_override_change", &self.on_override_change.is_some())
            .finish()
    }
}

/// Per-axis-kind send tracking.
#[derive(Debug, Clone, Copy)]
struct AxisState {
    last_send: Instant,
    last_rounded_value: i64,
    last_log: Instant,
}

/// Rate-limited, deduplicating command queue.
pub struct CommandQueue {
    queue: VecDeque<Command>,
    clamps: SafetyClamps,
    sink: Box<dyn CommandSink>,
    rate_limit: Duration,
    last_execution: Instant,
    /// Last value known to be held by the receiver, per kind.
    known_state: HashMap<CommandKind, CommandValue>,
    axis_state: HashMap<CommandKind, AxisState>,
    overrides: HashMap<OverrideAxis, Instant>,
    log: VecDeque<CommandLogEntry>,
    stats: QueueStats,
    callbacks: QueueCallbacks,
}

impl CommandQueue {
    /// Create a queue with the default rate limit.
    pub fn new(clamps: SafetyClamps, sink: Box<dyn CommandSink>) -> Self {
        Self::with_rate_limit(clamps, sink, DEFAULT_RATE_LIMIT)
    }

    /// Create a queue with an explicit rate limit.
    pub fn with_rate_limit(
        clamps: SafetyClamps,
        sink: Box<dyn CommandSink>,
        rate_limit: Duration,
    ) -> Self {
        Self {
            queue: VecDeque::new(),
            clamps,
            sink,
            rate_limit,
            last_execution: Instant::now(),
            known_state: HashMap::new(),
            axis_state: HashMap::new(),
            overrides: HashMap::new(),
            log: VecDeque::with_capacity(LOG_CAP),
            stats: QueueStats::default(),
            callbacks: QueueCallbacks::default(),
        }
    }

    /// Register queue callbacks.
    pub fn set_callbacks(&mut self, callbacks: QueueCallbacks) {
        self.callbacks = callbacks;
    }

    /// Replace the safety clamp table (profile change).
    pub fn set_clamps(&mut self, clamps: SafetyClamps) {
        self.clamps = clamps;
    }

    /// Number of queued non-axis commands.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Observability counters.
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// The retained execution log, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &CommandLogEntry> {
        self.log.iter()
    }

    /// Submit a command.
    pub fn enqueue(&mut self, cmd: Command) {
        self.enqueue_at(cmd, Instant::now());
    }

    /// Submit a command with an explicit timestamp.
    pub fn enqueue_at(&mut self, mut cmd: Command, now: Instant) {
        if !cmd.is_well_formed() {
            trace!(kind = %cmd.kind, "Dropping malformed command");
            self.stats.dropped_invalid += 1;
            return;
        }

        // Safety clamp, annotating the description
        if let CommandValue::Number(n) = cmd.value {
            let (clamped, changed) = self.clamps.apply(cmd.kind, n);
            if changed {
                cmd.value = CommandValue::Number(clamped);
                cmd.description.push_str(" (clamped)");
            }
        }

        // Pilot override suppresses every mapped command
        if let Some(axis) = cmd.kind.override_axis() {
            if self.override_active(axis, now) {
                debug!(kind = %cmd.kind, axis = %axis, "Dropping command under pilot override");
                self.stats.dropped_override += 1;
                return;
            }
        }

        if cmd.kind.family() == CommandFamily::Axis {
            self.send_axis(cmd, now);
            return;
        }

        // Dedup against the last known receiver state
        if !cmd.kind.is_dedup_exempt() && !cmd.kind.is_momentary() {
            if let Some(known) = self.known_state.get(&cmd.kind) {
                if known.matches(&cmd.value, SETPOINT_DEDUP_TOLERANCE) {
                    self.stats.dropped_dedup += 1;
                    return;
                }
            }
        }

        // Collapse: a queued command of the same kind takes the new value
        if let Some(existing) = self.queue.iter_mut().find(|c| c.kind == cmd.kind) {
            existing.value = cmd.value;
            existing.description = cmd.description;
            existing.priority = cmd.priority;
            return;
        }

        match cmd.priority {
            Priority::High => self.queue.push_front(cmd),
            Priority::Normal => self.queue.push_back(cmd),
        }

        if self.queue.len() > QUEUE_CAP {
            self.queue.pop_front();
            self.stats.overflow_evictions += 1;
            warn!("Command queue overflow, oldest entry evicted");
        }
    }

    /// Execute at most one due command.
    ///
    /// Returns the executed entry, or `None` when the queue is empty or the
    /// rate limit has not elapsed.
    pub fn drain(&mut self) -> Option<CommandLogEntry> {
        self.drain_at(Instant::now())
    }

    /// Execute with an explicit timestamp.
    pub fn drain_at(&mut self, now: Instant) -> Option<CommandLogEntry> {
        if now.duration_since(self.last_execution) < self.rate_limit {
            return None;
        }

        let cmd = self.queue.pop_front()?;
        self.execute(cmd, now)
    }

    /// Time until the next drain could execute, if anything is queued.
    pub fn next_drain_in(&self, now: Instant) -> Option<Duration> {
        if self.queue.is_empty() {
            return None;
        }
        Some(
            self.rate_limit
                .saturating_sub(now.duration_since(self.last_execution)),
        )
    }

    fn execute(&mut self, cmd: Command, now: Instant) -> Option<CommandLogEntry> {
        let wire = cmd.to_wire();

        if let Err(e) = self.sink.send(&wire) {
            warn!(event = wire.event, error = %e, "Bridge send failed, command dropped");
            self.stats.dropped_transport += 1;
            return None;
        }

        self.last_execution = now;
        self.known_state.insert(cmd.kind, cmd.value);
        self.stats.executed += 1;

        let entry = CommandLogEntry {
            kind: cmd.kind,
            event: wire.event,
            value: wire.value,
            description: cmd.description,
            executed_at: now,
        };

        debug!(event = entry.event, value = ?entry.value, "Executed {}", entry.description);

        self.push_log(entry.clone());
        if let Some(callback) = self.callbacks.on_command_executed.as_mut() {
            callback(&entry);
        }

        Some(entry)
    }

    /// Immediate axis dispatch with the per-kind 50 ms floor.
    fn send_axis(&mut self, cmd: Command, now: Instant) {
        let value = match cmd.value.as_number() {
            Some(v) => v,
            None => {
                self.stats.dropped_invalid += 1;
                return;
            }
        };

        if let Some(state) = self.axis_state.get(&cmd.kind) {
            if now.duration_since(state.last_send) < AXIS_MIN_INTERVAL {
                // The next tick re-asserts the axis anyway
                return;
            }
        }

        let wire = cmd.to_wire();
        if let Err(e) = self.sink.send(&wire) {
            warn!(event = wire.event, error = %e, "Axis send failed");
            self.stats.dropped_transport += 1;
            return;
        }

        let rounded = value.round() as i64;
        let (value_changed, last_log) = match self.axis_state.get(&cmd.kind) {
            Some(state) => (state.last_rounded_value != rounded, state.last_log),
            None => (true, now - AXIS_LOG_HEARTBEAT),
        };

        let should_log = value_changed || now.duration_since(last_log) >= AXIS_LOG_HEARTBEAT;

        self.axis_state.insert(
            cmd.kind,
            AxisState {
                last_send: now,
                last_rounded_value: rounded,
                last_log: if should_log { now } else { last_log },
            },
        );

        if should_log {
            let description = if value_changed {
                cmd.description.clone()
            } else {
                format!("{} (held)", cmd.description)
            };
            let entry = CommandLogEntry {
                kind: cmd.kind,
                event: wire.event,
                value: wire.value,
                description,
                executed_at: now,
            };
            trace!(event = entry.event, value = ?entry.value, "Axis {}", entry.description);
            self.push_log(entry.clone());
            if let Some(callback) = self.callbacks.on_command_executed.as_mut() {
                callback(&entry);
            }
        }
        self.stats.executed += 1;
    }

    fn push_log(&mut self, entry: CommandLogEntry) {
        self.log.push_back(entry);
        while self.log.len() > LOG_CAP {
            self.log.pop_front();
        }
    }

    /// Merge externally observed autopilot state into the dedup snapshot.
    pub fn update_ap_state(&mut self, observed: HashMap<CommandKind, CommandValue>) {
        for (kind, value) in observed {
            self.known_state.insert(kind, value);
        }
    }

    /// Register a pilot override on an axis.
    pub fn register_override(&mut self, axis: OverrideAxis, duration: Option<Duration>) {
        self.register_override_at(axis, duration, Instant::now());
    }

    /// Register an override with an explicit timestamp.
    pub fn register_override_at(
        &mut self,
        axis: OverrideAxis,
        duration: Option<Duration>,
        now: Instant,
    ) {
        let duration = duration.unwrap_or(DEFAULT_OVERRIDE_DURATION);
        self.overrides.insert(axis, now + duration);

        // Drop anything already queued for the overridden axis
        self.queue.retain(|cmd| cmd.kind.override_axis() != Some(axis));

        tracing::info!(axis = %axis, duration_ms = duration.as_millis() as u64, "Pilot override registered");

        let active = self.active_overrides_at(now);
        if let Some(callback) = self.callbacks.on_override_change.as_mut() {
            callback(&active);
        }
    }

    /// Unexpired overrides with remaining time.
    pub fn active_overrides(&self) -> Vec<ActiveOverride> {
        self.active_overrides_at(Instant::now())
    }

    /// Unexpired overrides at an explicit timestamp.
    pub fn active_overrides_at(&self, now: Instant) -> Vec<ActiveOverride> {
        let mut active: Vec<ActiveOverride> = self
            .overrides
            .iter()
            .filter(|(_, expiry)| **expiry > now)
            .map(|(axis, expiry)| ActiveOverride {
                axis: *axis,
                remaining: expiry.duration_since(now),
            })
            .collect();
        active.sort_by_key(|o| o.remaining);
        active
    }

    fn override_active(&self, axis: OverrideAxis, now: Instant) -> bool {
        self.overrides.get(&axis).is_some_and(|expiry| *expiry > now)
    }

    /// Forget the known receiver state so boundary-critical commands resend.
    ///
    /// Called by the supervisor on every phase change.
    pub fn clear_known_state(&mut self) {
        self.known_state.clear();
    }

    /// Drop all queued commands.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("queued", &self.queue.len())
            .field("overrides", &self.overrides.len())
            .field("stats", &self.stats)
            .finish()
    }
}
