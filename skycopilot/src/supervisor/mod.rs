//! Per-tick orchestration.
//!
//! The supervisor owns every subsystem and drives them in a fixed order on
//! each telemetry snapshot: classifier, ATC position update, terrain sweep,
//! rule engine, command queue. It exposes the pull-only status projection
//! consumed by UIs and the inbound APIs (overrides, clearances, remote AP
//! state, flight plans).
//!
//! Nothing in here throws: subsystems absorb their own faults and surface
//! them through advisories and counters.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::info;

use crate::atc::{
    AtcError, AtcPhase, GroundController, InstructionCallback, PlannerError, ReadbackResult,
    TaxiRoute,
};
use crate::command::{
    ActiveOverride, Command, CommandKind, CommandQueue, CommandSink, CommandValue, OverrideAxis,
    QueueCallbacks, QueueStats, SafetyClamps,
};
use crate::engine::{ApState, EnvelopeAlert, FlightPlan, RuleEngine, TakeoffPhase};
use crate::phase::{ClassifierConfig, FlightPhase, PhaseChangeCallback, PhaseClassifier, TakeoffGate};
use crate::profile::AircraftProfile;
use crate::telemetry::{TawsLevel, TelemetrySnapshot};
use crate::terrain::{TerrainDatabase, TerrainGuard};
use crate::wind::{TurbulenceDetector, TurbulenceLevel};

/// Supervisor construction parameters.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Target cruise altitude, feet MSL.
    pub target_cruise_alt_ft: f64,
    /// Departure field elevation, feet MSL.
    pub field_elevation_ft: f64,
    /// Non-axis command rate limit.
    pub rate_limit: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            target_cruise_alt_ft: 5500.0,
            field_elevation_ft: 0.0,
            rate_limit: crate::command::DEFAULT_RATE_LIMIT,
        }
    }
}

/// Immutable per-tick status projection for UIs.
///
/// Produced fresh every tick; consumers copy, never share.
#[derive(Debug, Clone)]
pub struct CopilotStatus {
    /// Classified flight phase.
    pub phase: FlightPhase,
    /// Takeoff sub-phase.
    pub takeoff_phase: TakeoffPhase,
    /// ATC ground phase.
    pub atc_phase: AtcPhase,
    /// Most severe envelope alert this tick.
    pub envelope_alert: EnvelopeAlert,
    /// Terrain alert level after TAWS merge.
    pub terrain_level: TawsLevel,
    /// Turbulence grade.
    pub turbulence: TurbulenceLevel,
    /// Queue counters.
    pub queue_stats: QueueStats,
    /// Unexpired pilot overrides.
    pub active_overrides: Vec<ActiveOverride>,
}

/// Owns and orchestrates the whole control core.
pub struct Supervisor {
    profile: AircraftProfile,
    config: SupervisorConfig,
    classifier: PhaseClassifier,
    atc: GroundController,
    engine: RuleEngine,
    queue: CommandQueue,
    terrain: TerrainGuard,
    turbulence: TurbulenceDetector,
    ap_state: ApState,
}

impl Supervisor {
    /// Build the full subsystem tree.
    pub fn new(
        profile: AircraftProfile,
        config: SupervisorConfig,
        sink: Box<dyn CommandSink>,
        terrain_db: Box<dyn TerrainDatabase>,
    ) -> Self {
        let classifier = PhaseClassifier::new(ClassifierConfig {
            target_cruise_alt_ft: config.target_cruise_alt_ft,
            field_elevation_ft: config.field_elevation_ft,
        });
        let engine = RuleEngine::new(profile.clone(), config.target_cruise_alt_ft);
        let queue = CommandQueue::with_rate_limit(
            SafetyClamps::from_profile(&profile),
            sink,
            config.rate_limit,
        );

        Self {
            profile,
            config,
            classifier,
            atc: GroundController::new(),
            engine,
            queue,
            terrain: TerrainGuard::new(terrain_db),
            turbulence: TurbulenceDetector::new(),
            ap_state: ApState::default(),
        }
    }

    /// Process one telemetry snapshot.
    pub fn tick(&mut self, snapshot: &TelemetrySnapshot) -> CopilotStatus {
        self.tick_at(snapshot, Instant::now())
    }

    /// Process one snapshot with an explicit timestamp.
    pub fn tick_at(&mut self, snapshot: &TelemetrySnapshot, now: Instant) -> CopilotStatus {
        self.turbulence.record_at(snapshot.vertical_speed, now);

        let gate: Option<&dyn TakeoffGate> = if self.atc.is_active() {
            Some(&self.atc)
        } else {
            None
        };
        let phase_changed = self.classifier.update_at(snapshot, gate, now);

        if self.atc.is_active() {
            self.atc.update_position_at(snapshot, now);
        }

        let terrain = self.terrain.check_at(snapshot, now);

        let commands = self.engine.evaluate(
            self.classifier.phase(),
            snapshot,
            &self.ap_state,
            phase_changed,
            Some(&self.atc),
            &terrain,
            now,
        );

        // Critical commands must resend across a phase boundary
        if phase_changed {
            self.queue.clear_known_state();
        }

        for command in commands {
            self.queue.enqueue_at(command, now);
        }
        self.queue.drain_at(now);

        CopilotStatus {
            phase: self.classifier.phase(),
            takeoff_phase: self.engine.takeoff_phase(),
            atc_phase: self.atc.phase(),
            envelope_alert: self.engine.last_alert(),
            terrain_level: terrain.level,
            turbulence: self.turbulence.level(),
            queue_stats: self.queue.stats(),
            active_overrides: self.queue.active_overrides_at(now),
        }
    }

    /// Current flight phase.
    pub fn phase(&self) -> FlightPhase {
        self.classifier.phase()
    }

    /// Force a flight phase until [`Self::resume_auto_phase`].
    ///
    /// A forced phase is a boundary like any other: the queue's dedup
    /// state clears so critical commands resend.
    pub fn force_phase(&mut self, phase: FlightPhase) {
        self.classifier.force_phase(phase);
        self.queue.clear_known_state();
    }

    /// Resume automatic phase classification.
    pub fn resume_auto_phase(&mut self) {
        self.classifier.resume_auto();
    }

    /// Attach the ground controller at the ramp.
    pub fn activate_atc(&mut self) {
        self.atc.activate();
    }

    /// Detach the ground controller.
    pub fn deactivate_atc(&mut self) {
        self.atc.deactivate();
    }

    /// Request taxi clearance; the caller runs the planner and reports the
    /// outcome through [`Self::deliver_taxi_route`].
    pub fn request_taxi_clearance(&mut self, icao: &str, runway: &str) -> Result<(), AtcError> {
        self.atc.request_taxi_clearance(icao, runway)
    }

    /// Deliver the planner outcome for a pending clearance.
    pub fn deliver_taxi_route(&mut self, result: Result<TaxiRoute, PlannerError>) {
        match result {
            Ok(route) => self.atc.route_received(route),
            Err(e) => self.atc.route_failed(&e.to_string()),
        }
    }

    /// Validate a pilot readback against the active clearance.
    pub fn check_readback(&self, text: &str) -> ReadbackResult {
        self.atc.check_readback(text)
    }

    /// Register a pilot override.
    pub fn register_override(&mut self, axis: OverrideAxis, duration: Option<Duration>) {
        self.queue.register_override(axis, duration);
    }

    /// Install or clear the local flight plan.
    pub fn set_flight_plan(&mut self, plan: Option<FlightPlan>) {
        self.engine.set_flight_plan(plan);
    }

    /// Hold or release a takeoff sub-phase (tuning front-ends).
    pub fn set_takeoff_hold(&mut self, phase: TakeoffPhase, held: bool) {
        self.engine.set_takeoff_hold(phase, held);
    }

    /// Merge autopilot panel state observed from the simulator.
    ///
    /// Updates both the engine's view and the queue's dedup snapshot so the
    /// core stops re-asserting what the receiver already holds.
    pub fn apply_remote_ap_state(&mut self, ap: ApState) {
        self.ap_state = ap;

        let mut observed: HashMap<CommandKind, CommandValue> = HashMap::new();
        observed.insert(CommandKind::ApMaster, CommandValue::Bool(ap.master));
        observed.insert(CommandKind::ApHdgHold, CommandValue::Bool(ap.hdg_hold));
        observed.insert(CommandKind::ApAltHold, CommandValue::Bool(ap.alt_hold));
        observed.insert(CommandKind::ApVsHold, CommandValue::Bool(ap.vs_hold));
        observed.insert(CommandKind::ApNav1Hold, CommandValue::Bool(ap.nav_hold));
        observed.insert(CommandKind::ApAprHold, CommandValue::Bool(ap.apr_hold));
        observed.insert(
            CommandKind::ApAltVarSet,
            CommandValue::Number(ap.selected_altitude_ft),
        );
        observed.insert(CommandKind::ApVsVarSet, CommandValue::Number(ap.selected_vs_fpm));
        observed.insert(CommandKind::ApSpdVarSet, CommandValue::Number(ap.selected_speed_kt));
        observed.insert(
            CommandKind::HeadingBugSet,
            CommandValue::Number(ap.selected_heading_deg),
        );
        self.queue.update_ap_state(observed);
    }

    /// Replace the aircraft profile; affected subsystems rebuild atomically.
    pub fn set_profile(&mut self, profile: AircraftProfile) {
        info!(id = %profile.id, "Aircraft profile replaced");
        self.queue.set_clamps(SafetyClamps::from_profile(&profile));
        self.engine.set_profile(profile.clone());
        self.profile = profile;
    }

    /// The active profile.
    pub fn profile(&self) -> &AircraftProfile {
        &self.profile
    }

    /// Register the phase-change callback.
    pub fn set_on_phase_change(&mut self, callback: PhaseChangeCallback) {
        self.classifier.set_on_phase_change(callback);
    }

    /// Register the ATC instruction callback.
    pub fn set_on_atc_instruction(&mut self, callback: InstructionCallback) {
        self.atc.set_on_instruction(callback);
    }

    /// Register queue callbacks (command executed, override change).
    pub fn set_queue_callbacks(&mut self, callbacks: QueueCallbacks) {
        self.queue.set_callbacks(callbacks);
    }

    /// Enqueue externally sourced commands (advisory acceptance).
    pub fn submit_commands(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.queue.enqueue(command);
        }
    }

    /// Tear down and rebuild every subsystem, keeping profile and config.
    pub fn reset(&mut self, sink: Box<dyn CommandSink>, terrain_db: Box<dyn TerrainDatabase>) {
        info!("Supervisor reset");
        *self = Self::new(self.profile.clone(), self.config.clone(), sink, terrain_db);
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("phase", &self.classifier.phase())
            .field("atc_phase", &self.atc.phase())
            .field("profile", &self.profile.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{TransportError, WireCommand};
    use crate::terrain::NoTerrainData;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<WireCommand>>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.sent.lock().iter().map(|w| w.event.to_string()).collect()
        }
    }

    impl CommandSink for RecordingSink {
        fn send(&mut self, wire: &WireCommand) -> Result<(), TransportError> {
            self.sent.lock().push(wire.clone());
            Ok(())
        }
    }

    fn supervisor() -> (Supervisor, RecordingSink) {
        let sink = RecordingSink::default();
        let supervisor = Supervisor::new(
            AircraftProfile::cessna_172(),
            SupervisorConfig::default(),
            Box::new(sink.clone()),
            Box::new(NoTerrainData),
        );
        (supervisor, sink)
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
    fn test_tick_classifies_and_dispatches() {
        let (mut supervisor, sink) = supervisor();
        let t0 = Instant::now();

        let mut snap = parked();
        snap.engine_rpm = 900.0;

        // First tick: PREFLIGHT -> TAXI, engine evaluates taxi rules
        let status = supervisor.tick_at(&snap, t0);
        assert_eq!(status.phase, FlightPhase::Taxi);

        // Commands flow out over subsequent drains
        for i in 1..6 {
            supervisor.tick_at(&snap, t0 + Duration::from_millis(600 * i));
        }
        assert!(!sink.events().is_empty());
    }

    #[test]
    fn test_phase_boundary_resends_critical_commands() {
        let (mut supervisor, sink) = supervisor();
        let t0 = Instant::now();

        let mut snap = parked();
        snap.engine_rpm = 900.0;

        // Reach taxi and settle: AP_MASTER executes once, then dedups
        supervisor.tick_at(&snap, t0);
        for i in 1..10 {
            supervisor.tick_at(&snap, t0 + Duration::from_millis(600 * i));
        }
        let before = sink.events().iter().filter(|e| *e == "AP_MASTER").count();
        assert_eq!(before, 1);

        // A phase boundary clears the dedup snapshot: the same AP_MASTER
        // state resends
        supervisor.force_phase(FlightPhase::Preflight);
        for i in 10..20 {
            supervisor.tick_at(&snap, t0 + Duration::from_millis(600 * i));
        }
        let after = sink.events().iter().filter(|e| *e == "AP_MASTER").count();
        assert!(after > before, "boundary must resend critical commands");
    }

    #[test]
    fn test_override_blocks_engine_commands() {
        let (mut supervisor, sink) = supervisor();
        let t0 = Instant::now();

        supervisor.register_override(OverrideAxis::Throttle, Some(Duration::from_secs(3600)));

        let mut snap = parked();
        snap.engine_rpm = 900.0;

        for i in 0..10 {
            supervisor.tick_at(&snap, t0 + Duration::from_millis(600 * i));
        }

        assert!(
            !sink.events().iter().any(|e| e == "THROTTLE_SET"),
            "throttle must stay untouched under override"
        );
        let status = supervisor.tick_at(&snap, t0 + Duration::from_secs(10));
        assert_eq!(status.active_overrides.len(), 1);
        assert_eq!(status.active_overrides[0].axis, OverrideAxis::Throttle);
    }

    #[test]
    fn test_atc_gates_takeoff_phase() {
        let (mut supervisor, _sink) = supervisor();
        let t0 = Instant::now();

        supervisor.activate_atc();
        supervisor.force_phase(FlightPhase::Taxi);
        supervisor.resume_auto_phase();

        // Rolling fast enough for takeoff but ATC says hold
        let mut snap = parked();
        snap.engine_rpm = 2300.0;
        snap.ground_speed = 30.0;

        let status = supervisor.tick_at(&snap, t0);
        assert_eq!(status.phase, FlightPhase::Taxi);
        assert_eq!(status.atc_phase, AtcPhase::Parked);
    }

    #[test]
    fn test_remote_ap_state_suppresses_reassertion() {
        let (mut supervisor, sink) = supervisor();
        let t0 = Instant::now();

        supervisor.force_phase(FlightPhase::Cruise);

        // The sim already holds cruise altitude 5500 and AP on
        supervisor.apply_remote_ap_state(ApState {
            master: true,
            alt_hold: true,
            selected_altitude_ft: 5500.0,
            ..Default::default()
        });

        let snap = TelemetrySnapshot {
            airspeed: 110.0,
            altitude_msl: 5500.0,
            altitude_agl: 4900.0,
            ..Default::default()
        };

        for i in 0..10 {
            supervisor.tick_at(&snap, t0 + Duration::from_millis(600 * i));
        }

        assert!(
            !sink.events().iter().any(|e| e == "AP_ALT_VAR_SET_ENGLISH"),
            "known altitude setpoint must dedup, sent: {:?}",
            sink.events()
        );
    }

    #[test]
    fn test_taxi_clearance_flow_through_supervisor() {
        let (mut supervisor, _sink) = supervisor();

        supervisor.activate_atc();
        supervisor.request_taxi_clearance("KPAE", "16R").unwrap();
        assert_eq!(supervisor.atc.phase(), AtcPhase::TaxiClearancePending);

        supervisor.deliver_taxi_route(Err(PlannerError::NoRoute("graph unavailable".into())));
        assert_eq!(supervisor.atc.phase(), AtcPhase::Parked);
    }

    #[test]
    fn test_status_projection_fields() {
        let (mut supervisor, _sink) = supervisor();
        let status = supervisor.tick_at(&parked(), Instant::now());

        assert_eq!(status.phase, FlightPhase::Preflight);
        assert_eq!(status.takeoff_phase, TakeoffPhase::BeforeRoll);
        assert_eq!(status.atc_phase, AtcPhase::Inactive);
        assert_eq!(status.envelope_alert, EnvelopeAlert::None);
        assert_eq!(status.terrain_level, TawsLevel::None);
        assert_eq!(status.turbulence, TurbulenceLevel::None);
        assert!(status.active_overrides.is_empty());
    }

    #[test]
    fn test_profile_replacement_updates_clamps() {
        let (mut supervisor, sink) = supervisor();
        let t0 = Instant::now();

        supervisor.set_profile(AircraftProfile::sr22());
        assert_eq!(supervisor.profile().id, "sr22");

        // SR22 min VS is -2000: a -1800 setpoint survives the clamp
        supervisor.submit_commands(vec![Command::set_value(
            CommandKind::ApVsVarSet,
            -1800.0,
            "steep descent",
        )]);
        supervisor.queue.drain_at(t0 + Duration::from_secs(1));

        let sent = sink.sent.lock();
        let vs = sent.iter().find(|w| w.event == "AP_VS_VAR_SET_ENGLISH").unwrap();
        assert_eq!(vs.value, Some(-1800.0));
    }
}
