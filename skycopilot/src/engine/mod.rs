//! Per-phase rule engine.
//!
//! Once per tick the engine takes the classified flight phase, the latest
//! telemetry, and the observed autopilot state, and emits the command set
//! that best tracks the phase's objectives. Envelope protections run after
//! the phase handler; since the queue keeps the newest command per kind,
//! safety output overrides phase output.
//!
//! The engine holds no references to other subsystems: ground guidance
//! comes in through [`GroundGuidance`], terrain through the assessment the
//! supervisor computed this tick.

pub mod control;
mod lateral;
mod safety;
mod takeoff;

pub use lateral::{compute_intercept_heading, FlightPlan, LateralDecision, PlanWaypoint};
pub use safety::EnvelopeAlert;
pub use takeoff::{TakeoffController, TakeoffPhase};

use std::time::{Duration, Instant};

use tracing::debug;

use crate::command::{Command, CommandKind};
use crate::envelope::FlightEnvelope;
use crate::phase::FlightPhase;
use crate::profile::AircraftProfile;
use crate::telemetry::{TawsLevel, TelemetrySnapshot};
use crate::terrain::TerrainAssessment;

use control::{ground_steer, PitchController, RollBiasEstimator, SteerRegime};
use lateral::decide_lateral;

/// Interval between engine auto-start attempts while taxiing dead.
const ENGINE_START_RETRY: Duration = Duration::from_secs(8);

/// Stall margin below which the climb rate is scaled back, knots.
const CLIMB_MARGIN_SCALE_KT: f64 = 15.0;

/// Floor on the stall-margin climb scale.
const CLIMB_SCALE_FLOOR: f64 = 0.3;

/// Taxi throttle when roughly aligned, percent.
const TAXI_THROTTLE_CRUISE_PCT: f64 = 12.0;

/// Taxi throttle while accelerating to the target speed, percent.
const TAXI_THROTTLE_ACCEL_PCT: f64 = 25.0;

/// Heading error above which taxi throttle is cut for the turn, degrees.
const TAXI_MISALIGNED_DEG: f64 = 30.0;

/// Observed autopilot panel state, merged from the simulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApState {
    /// AP master engaged.
    pub master: bool,
    /// Heading hold armed.
    pub hdg_hold: bool,
    /// Altitude hold armed.
    pub alt_hold: bool,
    /// Vertical-speed hold armed.
    pub vs_hold: bool,
    /// NAV coupling armed.
    pub nav_hold: bool,
    /// Approach coupling armed.
    pub apr_hold: bool,
    /// Speed hold armed.
    pub spd_hold: bool,
    /// Selected altitude, feet.
    pub selected_altitude_ft: f64,
    /// Selected vertical speed, fpm.
    pub selected_vs_fpm: f64,
    /// Selected speed, knots.
    pub selected_speed_kt: f64,
    /// Heading bug, degrees.
    pub selected_heading_deg: f64,
}

/// Ground steering targets from the ATC subsystem.
///
/// Implemented by the ground controller; the supervisor lends it per tick
/// so the engine never owns a back-pointer.
pub trait GroundGuidance {
    /// Whether ATC is holding the aircraft short of the runway.
    fn holding_short(&self) -> bool;

    /// Bearing to the next cleared taxi waypoint, if a route is active.
    fn steering_bearing(&self, lat: f64, lon: f64) -> Option<f64>;
}

/// Per-phase control-law engine.
pub struct RuleEngine {
    profile: AircraftProfile,
    target_cruise_alt_ft: f64,
    pitch: PitchController,
    roll_bias: RollBiasEstimator,
    takeoff: TakeoffController,
    flight_plan: Option<FlightPlan>,
    locked_runway_heading: Option<f64>,
    last_engine_start: Option<Instant>,
    last_alert: EnvelopeAlert,
}

impl RuleEngine {
    /// Create an engine for the given profile.
    pub fn new(profile: AircraftProfile, target_cruise_alt_ft: f64) -> Self {
        Self {
            profile,
            target_cruise_alt_ft,
            pitch: PitchController::new(),
            roll_bias: RollBiasEstimator::new(),
            takeoff: TakeoffController::new(),
            flight_plan: None,
            locked_runway_heading: None,
            last_engine_start: None,
            last_alert: EnvelopeAlert::None,
        }
    }

    /// Replace the aircraft profile; resets controller state.
    pub fn set_profile(&mut self, profile: AircraftProfile) {
        self.profile = profile;
        self.pitch.reset();
        self.roll_bias.reset();
        self.takeoff.reset();
    }

    /// Update the cruise altitude target.
    pub fn set_target_cruise_alt(&mut self, alt_ft: f64) {
        self.target_cruise_alt_ft = alt_ft;
    }

    /// Install or clear the local flight plan.
    pub fn set_flight_plan(&mut self, plan: Option<FlightPlan>) {
        self.flight_plan = plan;
    }

    /// The current takeoff sub-phase.
    pub fn takeoff_phase(&self) -> TakeoffPhase {
        self.takeoff.phase()
    }

    /// Hold or release a takeoff sub-phase.
    pub fn set_takeoff_hold(&mut self, phase: TakeoffPhase, held: bool) {
        self.takeoff.set_phase_hold(phase, held);
    }

    /// The most severe envelope alert from the last evaluation.
    pub fn last_alert(&self) -> EnvelopeAlert {
        self.last_alert
    }

    /// Evaluate one tick.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &mut self,
        phase: FlightPhase,
        snapshot: &TelemetrySnapshot,
        ap: &ApState,
        phase_changed: bool,
        ground: Option<&dyn GroundGuidance>,
        terrain: &TerrainAssessment,
        now: Instant,
    ) -> Vec<Command> {
        let mut out = Vec::new();

        if phase_changed {
            self.pitch.reset();
            if phase == FlightPhase::Takeoff {
                self.takeoff.reset();
            }
        }

        match phase {
            FlightPhase::Preflight => self.preflight(snapshot, &mut out),
            FlightPhase::Taxi => self.taxi(snapshot, ground, &mut out, now),
            FlightPhase::Takeoff => {
                if snapshot.on_ground() {
                    self.roll_bias.update(snapshot.bank, snapshot.throttle_pct);
                }
                self.takeoff.evaluate(
                    snapshot,
                    &self.profile,
                    self.target_cruise_alt_ft,
                    &mut self.pitch,
                    &self.roll_bias,
                    &mut out,
                    now,
                );
                self.locked_runway_heading = self.takeoff.runway_heading();
            }
            FlightPhase::Climb => self.climb(snapshot, phase_changed, &mut out),
            FlightPhase::Cruise => self.cruise(snapshot, &mut out),
            FlightPhase::Descent => self.descent(snapshot, &mut out),
            FlightPhase::Approach => self.approach(snapshot, &mut out),
            FlightPhase::Landing => self.landing(snapshot, &mut out),
        }

        // Envelope protections cover every airborne phase
        self.last_alert = if phase.is_airborne_or_takeoff() && phase != FlightPhase::Takeoff {
            let envelope = FlightEnvelope::compute(&self.profile, snapshot);
            safety::run_protections(snapshot, &envelope, ap, &self.profile, phase, &mut out)
        } else {
            EnvelopeAlert::None
        };

        if phase.is_airborne_or_takeoff() && phase != FlightPhase::Takeoff {
            self.respond_to_terrain(terrain, &mut out);
        }

        out
    }

    fn preflight(&mut self, snapshot: &TelemetrySnapshot, out: &mut Vec<Command>) {
        out.push(Command::toggle(CommandKind::ApMaster, false, "autopilot off for ground ops"));
        out.push(Command::toggle(CommandKind::MixtureRich, true, "mixture rich"));
        out.push(Command::set_value(CommandKind::ParkingBrakeSet, 0.0, "release parking brake"));
        out.push(Command::set_value(CommandKind::ThrottleSet, 15.0, "idle up"));

        if snapshot.ground_speed > 1.0 {
            let target = self.locked_runway_heading.unwrap_or(snapshot.heading);
            let steer = ground_steer(target, SteerRegime::Taxi, snapshot);
            out.push(Command::axis(CommandKind::SteeringSet, steer.rudder, "ground steering"));
        }
    }

    fn taxi(
        &mut self,
        snapshot: &TelemetrySnapshot,
        ground: Option<&dyn GroundGuidance>,
        out: &mut Vec<Command>,
        now: Instant,
    ) {
        out.push(Command::toggle(CommandKind::ApMaster, false, "autopilot off for taxi"));

        // Dead engine on the taxiway: retry the auto-start sequence
        if !snapshot.engine_is_running() {
            let due = match self.last_engine_start {
                Some(last) => now.duration_since(last) >= ENGINE_START_RETRY,
                None => true,
            };
            if due {
                self.last_engine_start = Some(now);
                out.push(Command::toggle(CommandKind::EngineAutoStart, true, "engine start"));
            }
            return;
        }

        if ground.map(|g| g.holding_short()).unwrap_or(false) {
            out.push(Command::set_value(CommandKind::ThrottleSet, 0.0, "hold short"));
            if snapshot.ground_speed < 1.0 {
                out.push(Command::set_value(CommandKind::ParkingBrakeSet, 1.0, "brake at hold"));
            }
            return;
        }

        let target = ground
            .and_then(|g| g.steering_bearing(snapshot.latitude, snapshot.longitude))
            .or(self.locked_runway_heading)
            .unwrap_or(snapshot.heading);

        let steer = ground_steer(target, SteerRegime::Taxi, snapshot);
        out.push(Command::axis(CommandKind::SteeringSet, steer.rudder, "taxi steering"));
        if steer.left_brake > 0.0 || steer.right_brake > 0.0 {
            out.push(Command::axis(CommandKind::AxisLeftBrakeSet, steer.left_brake, "taxi brake"));
            out.push(Command::axis(CommandKind::AxisRightBrakeSet, steer.right_brake, "taxi brake"));
        }

        // Heading-aware throttle toward the taxi target speed
        let misalignment = crate::geo::heading_error(snapshot.heading, target).abs();
        let target_gs = self.profile.phase_speeds.taxi;
        let throttle = if misalignment > TAXI_MISALIGNED_DEG {
            5.0
        } else if snapshot.ground_speed > target_gs + 3.0 {
            0.0
        } else if snapshot.ground_speed < target_gs - 3.0 {
            TAXI_THROTTLE_ACCEL_PCT
        } else {
            TAXI_THROTTLE_CRUISE_PCT
        };
        out.push(Command::set_value(CommandKind::ThrottleSet, throttle, "taxi speed"));
    }

    fn climb(&mut self, snapshot: &TelemetrySnapshot, phase_changed: bool, out: &mut Vec<Command>) {
        if phase_changed {
            self.release_axes(out);
        }

        out.push(Command::set_value(CommandKind::ThrottleSet, 100.0, "climb power"));
        out.push(Command::toggle(CommandKind::ApMaster, true, "autopilot on"));

        // Scale the climb back as the stall margin shrinks
        let envelope = FlightEnvelope::compute(&self.profile, snapshot);
        let vs = if envelope.stall_margin < CLIMB_MARGIN_SCALE_KT {
            let scale = (envelope.stall_margin / CLIMB_MARGIN_SCALE_KT).max(CLIMB_SCALE_FLOOR);
            self.profile.climb.climb_rate_fpm * scale
        } else {
            self.profile.climb.climb_rate_fpm
        };
        out.push(Command::set_value(CommandKind::ApVsVarSet, vs.round(), "climb rate"));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));

        out.push(Command::set_value(
            CommandKind::ApAltVarSet,
            self.target_cruise_alt_ft,
            "cruise altitude",
        ));

        self.apply_lateral(snapshot, out);
    }

    fn cruise(&mut self, snapshot: &TelemetrySnapshot, out: &mut Vec<Command>) {
        out.push(Command::toggle(CommandKind::ApMaster, true, "autopilot on"));
        out.push(Command::set_value(
            CommandKind::ApAltVarSet,
            self.target_cruise_alt_ft,
            "cruise altitude",
        ));
        out.push(Command::toggle(CommandKind::ApAltHold, true, "altitude hold"));
        out.push(Command::set_value(
            CommandKind::ApSpdVarSet,
            self.profile.speeds.vcruise,
            "cruise speed",
        ));

        // Manage throttle in the 70-100 band by speed error
        let error = self.profile.speeds.vcruise - snapshot.airspeed;
        let throttle = (85.0 + 2.0 * error).clamp(70.0, 100.0);
        out.push(Command::set_value(CommandKind::ThrottleSet, throttle.round(), "cruise power"));

        self.apply_lateral(snapshot, out);
    }

    fn descent(&mut self, snapshot: &TelemetrySnapshot, out: &mut Vec<Command>) {
        out.push(Command::toggle(CommandKind::ApMaster, true, "autopilot on"));
        out.push(Command::toggle(CommandKind::ApAltHold, false, "altitude hold off"));
        out.push(Command::set_value(
            CommandKind::ApVsVarSet,
            self.profile.climb.descent_rate_fpm,
            "descent rate",
        ));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));

        // Throttle backs off as speed builds in the descent
        let excess = snapshot.airspeed - self.profile.phase_speeds.descent;
        let throttle = (50.0 - 2.0 * excess).clamp(20.0, 75.0);
        out.push(Command::set_value(CommandKind::ThrottleSet, throttle.round(), "descent power"));

        self.apply_lateral(snapshot, out);
    }

    fn approach(&mut self, snapshot: &TelemetrySnapshot, out: &mut Vec<Command>) {
        out.push(Command::toggle(CommandKind::ApMaster, true, "autopilot on"));

        // Progressive flap schedule by AGL, gated on Vfe
        let desired_flaps: u8 = if snapshot.altitude_agl < 400.0 {
            3
        } else if snapshot.altitude_agl < 800.0 {
            2
        } else {
            1
        };
        if snapshot.flaps_index < desired_flaps && snapshot.airspeed < self.profile.speeds.vfe {
            out.push(Command::toggle(CommandKind::FlapsDown, true, "extend flaps"));
        }

        if snapshot.nav.cdi.gs_valid || snapshot.nav.approach.has_glideslope {
            out.push(Command::toggle(CommandKind::ApAprHold, true, "approach mode"));
        } else {
            self.apply_lateral(snapshot, out);
        }

        // Approach power, adjusted at the envelope edges
        let envelope = FlightEnvelope::compute(&self.profile, snapshot);
        let throttle = if envelope.stall_margin < 10.0 {
            55.0
        } else if snapshot.flaps_index > 0 && snapshot.airspeed > self.profile.speeds.vfe - 5.0 {
            30.0
        } else {
            40.0
        };
        out.push(Command::set_value(CommandKind::ThrottleSet, throttle, "approach power"));
        out.push(Command::set_value(
            CommandKind::ApSpdVarSet,
            self.profile.speeds.vapp,
            "approach speed",
        ));
    }

    fn landing(&mut self, snapshot: &TelemetrySnapshot, out: &mut Vec<Command>) {
        if snapshot.on_ground() {
            self.release_axes(out);
            out.push(Command::set_value(CommandKind::ThrottleSet, 0.0, "rollout"));
            if snapshot.flaps_index > 0 {
                out.push(Command::toggle(CommandKind::FlapsUp, true, "clean up flaps"));
            }
            if snapshot.ground_speed > 5.0 && snapshot.ground_speed < 40.0 {
                out.push(Command::axis(CommandKind::AxisLeftBrakeSet, 40.0, "rollout braking"));
                out.push(Command::axis(CommandKind::AxisRightBrakeSet, 40.0, "rollout braking"));
            }
            return;
        }

        // Airborne ladder: bleed the sink rate down the flare
        let agl = snapshot.altitude_agl;
        if agl >= 100.0 {
            out.push(Command::set_value(CommandKind::ApVsVarSet, -300.0, "final descent"));
            out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
        } else if agl >= 50.0 {
            out.push(Command::set_value(CommandKind::ApVsVarSet, -200.0, "short final"));
            out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
            out.push(Command::set_value(CommandKind::ThrottleSet, 20.0, "reduce power"));
        } else if agl >= 20.0 {
            out.push(Command::set_value(CommandKind::ApVsVarSet, -100.0, "over the threshold"));
            out.push(Command::set_value(CommandKind::ThrottleSet, 10.0, "power to idle"));
        } else {
            // Flare: the autopilot is done, ease the nose up manually
            out.push(Command::toggle(CommandKind::ApMaster, false, "autopilot off for flare"));
            out.push(Command::set_value(CommandKind::ThrottleSet, 0.0, "idle"));
            let flare_elevator = (-10.0 - (20.0 - agl) * 0.5).max(-20.0);
            out.push(Command::axis(CommandKind::AxisElevatorSet, flare_elevator, "flare"));
        }
    }

    fn apply_lateral(&mut self, snapshot: &TelemetrySnapshot, out: &mut Vec<Command>) {
        match decide_lateral(snapshot, self.flight_plan.as_mut()) {
            LateralDecision::EngageNav => {
                out.push(Command::toggle(CommandKind::ApNav1Hold, true, "nav coupled"));
            }
            LateralDecision::HeadingBug { heading, source } => {
                out.push(Command::set_value(CommandKind::HeadingBugSet, heading.round(), source));
                out.push(Command::toggle(CommandKind::ApHdgHold, true, "heading hold"));
            }
            LateralDecision::None => {}
        }
    }

    fn respond_to_terrain(&mut self, terrain: &TerrainAssessment, out: &mut Vec<Command>) {
        if terrain.level != TawsLevel::Warning {
            return;
        }
        let Some(escape_ft) = terrain.escape_altitude_ft else {
            return;
        };

        debug!(escape_ft, "Terrain escape climb");
        out.push(
            Command::set_value(CommandKind::ApAltVarSet, escape_ft.round(), "terrain escape")
                .with_high_priority(),
        );
        out.push(Command::set_value(
            CommandKind::ApVsVarSet,
            self.profile.climb.climb_rate_fpm,
            "terrain escape climb",
        ));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
        out.push(Command::set_value(CommandKind::ThrottleSet, 100.0, "full power"));
    }

    fn release_axes(&self, out: &mut Vec<Command>) {
        out.push(Command::axis(CommandKind::AxisElevatorSet, 0.0, "release elevator"));
        out.push(Command::axis(CommandKind::AxisAileronsSet, 0.0, "release ailerons"));
        out.push(Command::axis(CommandKind::AxisRudderSet, 0.0, "release rudder"));
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("profile", &self.profile.id)
            .field("target_cruise_alt_ft", &self.target_cruise_alt_ft)
            .field("takeoff_phase", &self.takeoff.phase())
            .field("last_alert", &self.last_alert)
            .finish()
    }
}
