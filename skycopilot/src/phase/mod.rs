//! Flight-phase classification.
//!
//! An 8-state machine inferring the coarse phase of flight from the latest
//! telemetry snapshot. Transitions are pure functions of the snapshot and
//! the current state; the only memory beyond the state itself is the phase
//! entry time, used for the age guards on descent detection.
//!
//! Takeoff is gated by the ground controller through the [`TakeoffGate`]
//! trait so the two subsystems stay decoupled.

use std::time::{Duration, Instant};

use crate::telemetry::TelemetrySnapshot;

/// Ground speed above which a ground roll counts as a takeoff (knots).
const TAKEOFF_ROLL_GS_KT: f64 = 25.0;

/// AGL at which a takeoff becomes an established climb (feet).
const CLIMB_ESTABLISHED_AGL_FT: f64 = 500.0;

/// Altitude band around the cruise target treated as "at cruise" (feet).
const CRUISE_CAPTURE_BAND_FT: f64 = 200.0;

/// AGL below which a descent becomes an approach (feet).
const APPROACH_AGL_FT: f64 = 2000.0;

/// AGL below which a descent becomes an approach with approach mode armed.
const APPROACH_ARMED_AGL_FT: f64 = 3000.0;

/// AGL below which a gear-down approach becomes a landing (feet).
const LANDING_AGL_FT: f64 = 200.0;

/// Ground speed below which a rollout becomes a taxi (knots).
const ROLLOUT_TAXI_GS_KT: f64 = 30.0;

/// Coarse flight phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlightPhase {
    /// On the ground, engine off or idling at the ramp.
    #[default]
    Preflight,
    /// Moving on the ground below takeoff speed.
    Taxi,
    /// Takeoff roll through initial climb-out.
    Takeoff,
    /// Established climb to the cruise altitude.
    Climb,
    /// Level at the cruise altitude.
    Cruise,
    /// Descending out of cruise.
    Descent,
    /// Low-altitude arrival segment.
    Approach,
    /// Short final through rollout.
    Landing,
}

impl FlightPhase {
    /// Whether this phase is flown (or departing) rather than ground ops.
    pub fn is_airborne_or_takeoff(&self) -> bool {
        !matches!(self, FlightPhase::Preflight | FlightPhase::Taxi)
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            FlightPhase::Preflight => "preflight checks",
            FlightPhase::Taxi => "ground taxi",
            FlightPhase::Takeoff => "takeoff",
            FlightPhase::Climb => "climb",
            FlightPhase::Cruise => "cruise flight",
            FlightPhase::Descent => "descent",
            FlightPhase::Approach => "approach",
            FlightPhase::Landing => "landing",
        }
    }
}

impl std::fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightPhase::Preflight => write!(f, "preflight"),
            FlightPhase::Taxi => write!(f, "taxi"),
            FlightPhase::Takeoff => write!(f, "takeoff"),
            FlightPhase::Climb => write!(f, "climb"),
            FlightPhase::Cruise => write!(f, "cruise"),
            FlightPhase::Descent => write!(f, "descent"),
            FlightPhase::Approach => write!(f, "approach"),
            FlightPhase::Landing => write!(f, "landing"),
        }
    }
}

/// Takeoff permission from the ground controller.
///
/// Implemented by the ATC subsystem; the classifier holds no reference to
/// ATC itself, the supervisor lends the gate per tick.
pub trait TakeoffGate {
    /// Whether a takeoff roll is currently permitted.
    fn takeoff_permitted(&self) -> bool;
}

/// Classifier configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Target cruise altitude, feet MSL.
    pub target_cruise_alt_ft: f64,
    /// Departure/destination field elevation, feet MSL.
    pub field_elevation_ft: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            target_cruise_alt_ft: 5500.0,
            field_elevation_ft: 0.0,
        }
    }
}

/// Callback invoked on every phase change: `(old, new)`.
pub type PhaseChangeCallback = Box<dyn FnMut(FlightPhase, FlightPhase) + Send>;

/// Infers the coarse flight phase from telemetry.
pub struct PhaseClassifier {
    phase: FlightPhase,
    phase_entered_at: Instant,
    config: ClassifierConfig,
    forced: bool,
    on_phase_change: Option<PhaseChangeCallback>,
}

impl PhaseClassifier {
    /// Create a classifier starting in PREFLIGHT.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            phase: FlightPhase::Preflight,
            phase_entered_at: Instant::now(),
            config,
            forced: false,
            on_phase_change: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    /// How long the current phase has been active.
    pub fn phase_age(&self) -> Duration {
        self.phase_entered_at.elapsed()
    }

    /// Classifier configuration (read-only).
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Update the target cruise altitude.
    pub fn set_target_cruise_alt(&mut self, alt_ft: f64) {
        self.config.target_cruise_alt_ft = alt_ft;
    }

    /// Update the field elevation.
    pub fn set_field_elevation(&mut self, elevation_ft: f64) {
        self.config.field_elevation_ft = elevation_ft;
    }

    /// Register the phase-change callback.
    pub fn set_on_phase_change(&mut self, callback: PhaseChangeCallback) {
        self.on_phase_change = Some(callback);
    }

    /// Force a phase, bypassing all transitions until [`Self::resume_auto`].
    pub fn force_phase(&mut self, phase: FlightPhase) {
        self.forced = true;
        if phase != self.phase {
            self.transition(phase, Instant::now());
        }
    }

    /// Resume automatic classification.
    pub fn resume_auto(&mut self) {
        self.forced = false;
    }

    /// Whether a manual phase override is active.
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Feed a telemetry snapshot. Returns true if the phase changed.
    pub fn update(
        &mut self,
        snapshot: &TelemetrySnapshot,
        takeoff_gate: Option<&dyn TakeoffGate>,
    ) -> bool {
        self.update_at(snapshot, takeoff_gate, Instant::now())
    }

    /// Feed a snapshot with an explicit timestamp.
    pub fn update_at(
        &mut self,
        snapshot: &TelemetrySnapshot,
        takeoff_gate: Option<&dyn TakeoffGate>,
        now: Instant,
    ) -> bool {
        if self.forced {
            return false;
        }

        if let Some(next) = self.next_phase(snapshot, takeoff_gate, now) {
            self.transition(next, now);
            return true;
        }

        false
    }

    fn transition(&mut self, next: FlightPhase, now: Instant) {
        let old = self.phase;
        self.phase = next;
        self.phase_entered_at = now;

        tracing::info!(from = %old, to = %next, "Flight phase transition");

        if let Some(callback) = self.on_phase_change.as_mut() {
            callback(old, next);
        }
    }

    fn next_phase(
        &self,
        snapshot: &TelemetrySnapshot,
        takeoff_gate: Option<&dyn TakeoffGate>,
        now: Instant,
    ) -> Option<FlightPhase> {
        let on_ground = snapshot.on_ground();
        let agl = snapshot.altitude_agl;
        let alt = snapshot.altitude_msl;
        let target = self.config.target_cruise_alt_ft;
        let phase_age = now.duration_since(self.phase_entered_at);

        // Catch-up: started mid-air while the state machine still thinks we
        // are on the ramp
        if matches!(self.phase, FlightPhase::Preflight | FlightPhase::Taxi)
            && !on_ground
            && agl > 100.0
            && snapshot.airspeed > 30.0
        {
            return Some(self.airborne_catch_up(snapshot));
        }

        // Ground reset: airborne state but sitting on the ground with the
        // engine off. Landing keeps its own rollout transition.
        if on_ground
            && !snapshot.engine_is_running()
            && self.phase.is_airborne_or_takeoff()
            && self.phase != FlightPhase::Landing
        {
            return Some(FlightPhase::Preflight);
        }

        match self.phase {
            FlightPhase::Preflight => {
                if (snapshot.engine_is_running() || snapshot.throttle_pct > 10.0) && on_ground {
                    return Some(FlightPhase::Taxi);
                }
            }
            FlightPhase::Taxi => {
                let gate_open = takeoff_gate.map(|g| g.takeoff_permitted()).unwrap_or(true);
                if snapshot.ground_speed > TAKEOFF_ROLL_GS_KT && on_ground && gate_open {
                    return Some(FlightPhase::Takeoff);
                }
            }
            FlightPhase::Takeoff => {
                if !on_ground && agl > CLIMB_ESTABLISHED_AGL_FT {
                    return Some(FlightPhase::Climb);
                }
            }
            FlightPhase::Climb => {
                if alt >= target - CRUISE_CAPTURE_BAND_FT {
                    return Some(FlightPhase::Cruise);
                }
            }
            FlightPhase::Cruise => {
                let dist = snapshot.nav.dest_dist_nm;
                let tod_nm = (alt - self.config.field_elevation_ft) / 1000.0 * 3.0;
                let at_tod = dist > 0.0 && dist < tod_nm && dist < 100.0;

                let drifting_down = snapshot.vertical_speed < -300.0
                    && alt < target - 500.0
                    && phase_age > Duration::from_secs(30);

                let above_target = alt > target + 500.0 && phase_age > Duration::from_secs(5);

                if at_tod || drifting_down || above_target {
                    return Some(FlightPhase::Descent);
                }
            }
            FlightPhase::Descent => {
                let approach_armed = !snapshot.nav.approach.mode.is_empty();
                let gate_agl = if approach_armed {
                    APPROACH_ARMED_AGL_FT
                } else {
                    APPROACH_AGL_FT
                };
                if agl < gate_agl {
                    return Some(FlightPhase::Approach);
                }
            }
            FlightPhase::Approach => {
                if agl < LANDING_AGL_FT && snapshot.gear_down {
                    return Some(FlightPhase::Landing);
                }
                // Go-around: climbing back toward the cruise target
                if alt > target - 500.0 && snapshot.vertical_speed > 300.0 {
                    return Some(FlightPhase::Climb);
                }
            }
            FlightPhase::Landing => {
                if on_ground && snapshot.ground_speed < ROLLOUT_TAXI_GS_KT {
                    return Some(FlightPhase::Taxi);
                }
            }
        }

        None
    }

    /// Pick the airborne state matching the snapshot for startup catch-up.
    fn airborne_catch_up(&self, snapshot: &TelemetrySnapshot) -> FlightPhase {
        let target = self.config.target_cruise_alt_ft;

        if snapshot.altitude_msl >= target - CRUISE_CAPTURE_BAND_FT {
            FlightPhase::Cruise
        } else if snapshot.vertical_speed > 300.0 {
            FlightPhase::Climb
        } else if snapshot.vertical_speed < -300.0 && snapshot.altitude_agl < APPROACH_ARMED_AGL_FT
        {
            FlightPhase::Approach
        } else {
            FlightPhase::Cruise
        }
    }
}

impl std::fmt::Debug for PhaseClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseClassifier")
            .field("phase", &self.phase)
            .field("forced", &self.forced)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Gate(bool);

    impl TakeoffGate for Gate {
        fn takeoff_permitted(&self) -> bool {
            self.0
        }
    }

    fn classifier() -> PhaseClassifier {
        PhaseClassifier::new(ClassifierConfig {
            target_cruise_alt_ft: 5500.0,
            field_elevation_ft: 600.0,
        })
    }

    fn parked() -> TelemetrySnapshot {
        TelemetrySnapshot {
            raw_on_ground: true,
            altitude_agl: 0.0,
            altitude_msl: 600.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_preflight_to_taxi_on_engine_start() {
        let mut c = classifier();
        let mut snap = parked();

        assert!(!c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Preflight);

        snap.engine_rpm = 900.0;
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Taxi);
    }

    #[test]
    fn test_preflight_to_taxi_on_throttle() {
        let mut c = classifier();
        let mut snap = parked();
        snap.throttle_pct = 20.0;

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Taxi);
    }

    #[test]
    fn test_taxi_to_takeoff_requires_gate() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Taxi);
        c.resume_auto();

        let mut snap = parked();
        snap.engine_rpm = 2300.0;
        snap.ground_speed = 30.0;

        // Held by ATC
        assert!(!c.update_at(&snap, Some(&Gate(false)), Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Taxi);

        // Cleared
        assert!(c.update_at(&snap, Some(&Gate(true)), Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Takeoff);
    }

    #[test]
    fn test_taxi_to_takeoff_without_atc() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Taxi);
        c.resume_auto();

        let mut snap = parked();
        snap.engine_rpm = 2300.0;
        snap.ground_speed = 30.0;

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Takeoff);
    }

    #[test]
    fn test_takeoff_to_climb_above_500_agl() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Takeoff);
        c.resume_auto();

        let snap = TelemetrySnapshot {
            altitude_agl: 650.0,
            altitude_msl: 1250.0,
            airspeed: 75.0,
            vertical_speed: 700.0,
            engine_rpm: 2500.0,
            ..Default::default()
        };

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Climb);
    }

    #[test]
    fn test_climb_to_cruise_at_target_band() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Climb);
        c.resume_auto();

        let snap = TelemetrySnapshot {
            altitude_msl: 5350.0,
            altitude_agl: 4750.0,
            airspeed: 100.0,
            engine_rpm: 2400.0,
            ..Default::default()
        };

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Cruise);
    }

    #[test]
    fn test_cruise_to_descent_at_top_of_descent() {
        let base = Instant::now();
        let mut c = classifier();
        c.force_phase(FlightPhase::Cruise);
        c.resume_auto();

        let mut snap = TelemetrySnapshot {
            altitude_msl: 5500.0,
            altitude_agl: 4900.0,
            airspeed: 110.0,
            engine_rpm: 2400.0,
            ..Default::default()
        };

        // TOD = (5500 - 600)/1000 * 3 = 14.7 nm
        snap.nav.dest_dist_nm = 20.0;
        assert!(!c.update_at(&snap, None, base));

        snap.nav.dest_dist_nm = 12.0;
        assert!(c.update_at(&snap, None, base + Duration::from_secs(1)));
        assert_eq!(c.phase(), FlightPhase::Descent);
    }

    #[test]
    fn test_cruise_to_descent_age_guard_on_drift() {
        let base = Instant::now();
        let mut c = classifier();
        c.force_phase(FlightPhase::Cruise);
        c.resume_auto();

        // Drifting down well below target
        let snap = TelemetrySnapshot {
            altitude_msl: 4800.0,
            altitude_agl: 4200.0,
            vertical_speed: -400.0,
            airspeed: 115.0,
            engine_rpm: 2400.0,
            ..Default::default()
        };

        // Too young: the age guard holds the phase
        assert!(!c.update_at(&snap, None, base + Duration::from_secs(10)));

        // Past 30 s of cruise the drift is real
        assert!(c.update_at(&snap, None, base + Duration::from_secs(31)));
        assert_eq!(c.phase(), FlightPhase::Descent);
    }

    #[test]
    fn test_descent_to_approach_agl_gates() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Descent);
        c.resume_auto();

        let mut snap = TelemetrySnapshot {
            altitude_msl: 3300.0,
            altitude_agl: 2700.0,
            vertical_speed: -500.0,
            airspeed: 100.0,
            engine_rpm: 2200.0,
            ..Default::default()
        };

        // 2700 AGL: too high without approach mode
        assert!(!c.update_at(&snap, None, Instant::now()));

        // Approach mode armed widens the gate to 3000 AGL
        snap.nav.approach.mode = "RNAV".to_string();
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Approach);
    }

    #[test]
    fn test_approach_to_landing_needs_gear() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Approach);
        c.resume_auto();

        let mut snap = TelemetrySnapshot {
            altitude_msl: 750.0,
            altitude_agl: 150.0,
            vertical_speed: -400.0,
            airspeed: 65.0,
            engine_rpm: 1800.0,
            ..Default::default()
        };

        snap.gear_down = false;
        assert!(!c.update_at(&snap, None, Instant::now()));

        snap.gear_down = true;
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Landing);
    }

    #[test]
    fn test_approach_go_around() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Approach);
        c.resume_auto();

        let snap = TelemetrySnapshot {
            altitude_msl: 5200.0,
            altitude_agl: 4600.0,
            vertical_speed: 600.0,
            airspeed: 80.0,
            engine_rpm: 2600.0,
            ..Default::default()
        };

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Climb);
    }

    #[test]
    fn test_landing_rollout_to_taxi() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Landing);
        c.resume_auto();

        let mut snap = parked();
        snap.engine_rpm = 1000.0;
        snap.ground_speed = 45.0;

        assert!(!c.update_at(&snap, None, Instant::now()));

        snap.ground_speed = 20.0;
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Taxi);
    }

    #[test]
    fn test_startup_catch_up_to_cruise() {
        let mut c = classifier();

        let snap = TelemetrySnapshot {
            altitude_msl: 6500.0,
            altitude_agl: 5900.0,
            airspeed: 115.0,
            vertical_speed: 0.0,
            engine_rpm: 2400.0,
            ..Default::default()
        };

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Cruise);
    }

    #[test]
    fn test_startup_catch_up_to_climb() {
        let mut c = classifier();

        let snap = TelemetrySnapshot {
            altitude_msl: 2500.0,
            altitude_agl: 1900.0,
            airspeed: 80.0,
            vertical_speed: 700.0,
            engine_rpm: 2500.0,
            ..Default::default()
        };

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Climb);
    }

    #[test]
    fn test_startup_catch_up_to_approach() {
        let mut c = classifier();

        let snap = TelemetrySnapshot {
            altitude_msl: 2100.0,
            altitude_agl: 1500.0,
            airspeed: 75.0,
            vertical_speed: -500.0,
            engine_rpm: 2000.0,
            ..Default::default()
        };

        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Approach);
    }

    #[test]
    fn test_ground_reset_from_airborne_state() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Cruise);
        c.resume_auto();

        // Sitting on the ramp, engine off, but the machine thinks cruise
        let snap = parked();
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Preflight);
    }

    #[test]
    fn test_ground_reset_does_not_preempt_landing() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Landing);
        c.resume_auto();

        // Rolled out to a stop with the engine failed: LANDING's own
        // transition to TAXI applies, not the reset
        let snap = parked();
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Taxi);
    }

    #[test]
    fn test_forced_phase_bypasses_transitions() {
        let mut c = classifier();
        c.force_phase(FlightPhase::Cruise);

        // Snapshot that would otherwise ground-reset
        let snap = parked();
        assert!(!c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Cruise);

        c.resume_auto();
        assert!(c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Preflight);
    }

    #[test]
    fn test_phase_change_callback_fires_exactly_on_change() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let mut c = classifier();
        c.set_on_phase_change(Box::new(move |_old, _new| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let mut snap = parked();
        c.update_at(&snap, None, Instant::now());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        snap.engine_rpm = 900.0;
        c.update_at(&snap, None, Instant::now());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Same snapshot again: no change, no callback
        c.update_at(&snap, None, Instant::now());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_inputs_leave_state_unchanged() {
        let mut c = classifier();
        // All-zero snapshot: nothing matches, state stays put
        let snap = TelemetrySnapshot::default();
        assert!(!c.update_at(&snap, None, Instant::now()));
        assert_eq!(c.phase(), FlightPhase::Preflight);
    }
}
