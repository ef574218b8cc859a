//! Takeoff sub-phase machine.
//!
//! Runs the departure from brake release through AP handoff:
//! BEFORE_ROLL → ROLL → ROTATE → LIFTOFF → INITIAL_CLIMB → DEPARTURE.
//! The flight-phase classifier ends the sequence by moving to CLIMB once
//! established; [`TakeoffController::reset`] rearms it for the next flight.
//!
//! Individual sub-phases can be held in place with a phase-hold flag (used
//! by tuning front-ends); a held phase emits its commands but never
//! advances.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info};

use crate::command::{Command, CommandKind};
use crate::profile::AircraftProfile;
use crate::telemetry::TelemetrySnapshot;

use super::control::{ground_steer, target_bank, PitchController, RollBiasEstimator, SteerRegime};

/// Elevator at the start of the rotation ramp, percent.
const ROTATE_RAMP_START_PCT: f64 = -3.0;

/// Rotation ramp rate, percent per second.
const ROTATE_RAMP_RATE_PCT_PER_S: f64 = 2.0;

/// Wings-level aileron gain during liftoff.
const LIFTOFF_BANK_GAIN: f64 = 3.0;

/// Climb rate confirming a positive climb, fpm.
const POSITIVE_CLIMB_VS_FPM: f64 = 100.0;

/// AGL confirming the liftoff segment is done, feet.
const LIFTOFF_DONE_AGL_FT: f64 = 200.0;

/// Margin over the clean stall speed required for AP handoff, knots.
const AP_HANDOFF_STALL_MARGIN_KT: f64 = 15.0;

/// Minimum climb pitch enforced during liftoff and initial climb, degrees.
const MIN_CLIMB_PITCH_DEG: f64 = 4.0;

/// Takeoff sub-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TakeoffPhase {
    /// Lined up, pre-roll checks.
    #[default]
    BeforeRoll,
    /// Accelerating on the runway.
    Roll,
    /// Rotating at Vr.
    Rotate,
    /// Airborne, establishing a positive climb.
    Liftoff,
    /// Climbing out to the AP handoff gate.
    InitialClimb,
    /// Cleanup after AP handoff.
    Departure,
}

impl std::fmt::Display for TakeoffPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TakeoffPhase::BeforeRoll => "before-roll",
            TakeoffPhase::Roll => "roll",
            TakeoffPhase::Rotate => "rotate",
            TakeoffPhase::Liftoff => "liftoff",
            TakeoffPhase::InitialClimb => "initial-climb",
            TakeoffPhase::Departure => "departure",
        };
        write!(f, "{}", name)
    }
}

/// Drives one takeoff from brake release to AP handoff.
#[derive(Debug)]
pub struct TakeoffController {
    phase: TakeoffPhase,
    /// Runway heading captured at the start of the roll.
    runway_heading: Option<f64>,
    rotate_started: Option<Instant>,
    ap_engaged: bool,
    holds: HashSet<TakeoffPhase>,
}

impl TakeoffController {
    /// Create a controller at BEFORE_ROLL.
    pub fn new() -> Self {
        Self {
            phase: TakeoffPhase::BeforeRoll,
            runway_heading: None,
            rotate_started: None,
            ap_engaged: false,
            holds: HashSet::new(),
        }
    }

    /// Current sub-phase.
    pub fn phase(&self) -> TakeoffPhase {
        self.phase
    }

    /// The runway heading captured at roll start.
    pub fn runway_heading(&self) -> Option<f64> {
        self.runway_heading
    }

    /// Hold or release a sub-phase gate.
    pub fn set_phase_hold(&mut self, phase: TakeoffPhase, held: bool) {
        if held {
            self.holds.insert(phase);
        } else {
            self.holds.remove(&phase);
        }
    }

    /// Rearm for the next takeoff.
    pub fn reset(&mut self) {
        self.phase = TakeoffPhase::BeforeRoll;
        self.runway_heading = None;
        self.rotate_started = None;
        self.ap_engaged = false;
    }

    fn advance(&mut self, next: TakeoffPhase) -> bool {
        if self.holds.contains(&self.phase) {
            debug!(phase = %self.phase, "Takeoff sub-phase held");
            return false;
        }
        info!(from = %self.phase, to = %next, "Takeoff sub-phase transition");
        self.phase = next;
        true
    }

    /// Run one tick of the takeoff sequence.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &mut self,
        snapshot: &TelemetrySnapshot,
        profile: &AircraftProfile,
        target_cruise_alt_ft: f64,
        pitch: &mut PitchController,
        roll_bias: &RollBiasEstimator,
        out: &mut Vec<Command>,
        now: Instant,
    ) {
        match self.phase {
            TakeoffPhase::BeforeRoll => {
                out.push(Command::axis(CommandKind::AxisElevatorSet, 0.0, "center elevator"));
                out.push(Command::axis(CommandKind::AxisAileronsSet, 0.0, "center ailerons"));
                out.push(Command::axis(CommandKind::AxisRudderSet, 0.0, "center rudder"));
                out.push(Command::toggle(CommandKind::MixtureRich, true, "mixture rich"));
                out.push(Command::set_value(
                    CommandKind::ParkingBrakeSet,
                    0.0,
                    "release parking brake",
                ));

                if !snapshot.parking_brake {
                    if self.advance(TakeoffPhase::Roll) {
                        self.runway_heading = Some(snapshot.heading);
                    }
                }
            }
            TakeoffPhase::Roll => {
                let runway_heading = *self.runway_heading.get_or_insert(snapshot.heading);

                out.push(Command::set_value(CommandKind::ThrottleSet, 100.0, "takeoff power"));

                let steer = ground_steer(runway_heading, SteerRegime::TakeoffRoll, snapshot);
                out.push(Command::axis(CommandKind::AxisRudderSet, steer.rudder, "runway tracking"));
                if steer.left_brake > 0.0 || steer.right_brake > 0.0 {
                    out.push(Command::axis(
                        CommandKind::AxisLeftBrakeSet,
                        steer.left_brake,
                        "differential brake",
                    ));
                    out.push(Command::axis(
                        CommandKind::AxisRightBrakeSet,
                        steer.right_brake,
                        "differential brake",
                    ));
                }

                out.push(Command::axis(CommandKind::AxisElevatorSet, 0.0, "elevator neutral"));

                let aileron = target_bank(0.0, 30.0, snapshot, roll_bias.value(), true);
                out.push(Command::axis(CommandKind::AxisAileronsSet, aileron, "wings level"));

                if snapshot.airspeed >= profile.speeds.vr && self.advance(TakeoffPhase::Rotate) {
                    self.rotate_started = Some(now);
                }
            }
            TakeoffPhase::Rotate => {
                out.push(Command::set_value(CommandKind::ThrottleSet, 100.0, "takeoff power"));

                // Progressive pull: ramp from -3% toward the configured floor
                let ramp_secs = self
                    .rotate_started
                    .map(|t| now.duration_since(t).as_secs_f64())
                    .unwrap_or(0.0);
                let elevator = (ROTATE_RAMP_START_PCT - ROTATE_RAMP_RATE_PCT_PER_S * ramp_secs)
                    .max(profile.takeoff.rotate_elevator_floor_pct);
                out.push(Command::axis(CommandKind::AxisElevatorSet, elevator, "rotation"));

                let aileron = target_bank(0.0, 30.0, snapshot, roll_bias.value(), true);
                out.push(Command::axis(CommandKind::AxisAileronsSet, aileron, "wings level"));

                if !snapshot.on_ground() {
                    self.advance(TakeoffPhase::Liftoff);
                }
            }
            TakeoffPhase::Liftoff => {
                out.push(Command::set_value(CommandKind::ThrottleSet, 100.0, "takeoff power"));

                // Hold the liftoff pitch target, easing off near the stall
                let mut pitch_target = profile.takeoff.liftoff_pitch_deg;
                if snapshot.airspeed < profile.speeds.vs1 + 5.0 {
                    pitch_target = MIN_CLIMB_PITCH_DEG;
                }
                let elevator = pitch.target_pitch(pitch_target, 30.0, snapshot, profile, now);
                out.push(Command::axis(CommandKind::AxisElevatorSet, elevator, "liftoff pitch"));

                let aileron = (-snapshot.bank * LIFTOFF_BANK_GAIN + roll_bias.value())
                    .clamp(-30.0, 30.0);
                out.push(Command::axis(CommandKind::AxisAileronsSet, aileron, "wings level"));

                if snapshot.vertical_speed > POSITIVE_CLIMB_VS_FPM
                    && snapshot.altitude_agl > LIFTOFF_DONE_AGL_FT
                {
                    self.advance(TakeoffPhase::InitialClimb);
                }
            }
            TakeoffPhase::InitialClimb => {
                out.push(Command::set_value(CommandKind::ThrottleSet, 100.0, "climb power"));

                pitch.min_climb_pitch_deg = Some(MIN_CLIMB_PITCH_DEG);
                let elevator =
                    pitch.pitch_for_speed(profile.speeds.vy, 30.0, snapshot, profile, now);
                out.push(Command::axis(CommandKind::AxisElevatorSet, elevator, "climb at Vy"));

                let aileron = (-snapshot.bank * LIFTOFF_BANK_GAIN + roll_bias.value())
                    .clamp(-30.0, 30.0);
                out.push(Command::axis(CommandKind::AxisAileronsSet, aileron, "wings level"));

                let handoff_speed = profile.speeds.vs1 + AP_HANDOFF_STALL_MARGIN_KT;
                if snapshot.airspeed >= handoff_speed
                    && snapshot.altitude_agl > profile.takeoff.initial_climb_agl_ft
                    && self.advance(TakeoffPhase::Departure)
                {
                    self.ap_engaged = true;

                    // Hand the airplane to the autopilot
                    out.push(Command::axis(CommandKind::AxisElevatorSet, 0.0, "release elevator"));
                    out.push(Command::axis(CommandKind::AxisAileronsSet, 0.0, "release ailerons"));
                    out.push(Command::axis(CommandKind::AxisRudderSet, 0.0, "release rudder"));

                    let heading = self.runway_heading.unwrap_or(snapshot.heading).round();
                    out.push(Command::set_value(
                        CommandKind::HeadingBugSet,
                        heading,
                        "runway heading",
                    ));
                    out.push(Command::toggle(CommandKind::ApMaster, true, "autopilot on"));
                    out.push(Command::toggle(CommandKind::ApHdgHold, true, "heading hold"));
                    out.push(Command::set_value(
                        CommandKind::ApVsVarSet,
                        profile.climb.climb_rate_fpm,
                        "climb rate",
                    ));
                    out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
                }
            }
            TakeoffPhase::Departure => {
                if snapshot.flaps_index > 0
                    && snapshot.altitude_agl > profile.takeoff.flap_retract_agl_ft
                {
                    out.push(Command::toggle(CommandKind::FlapsUp, true, "retract flaps"));
                }
                out.push(Command::set_value(
                    CommandKind::ApSpdVarSet,
                    profile.speeds.vy,
                    "departure speed",
                ));
                out.push(Command::set_value(
                    CommandKind::ApAltVarSet,
                    target_cruise_alt_ft,
                    "cruise altitude",
                ));
                out.push(Command::toggle(
                    CommandKind::LandingLightsToggle,
                    false,
                    "landing lights off",
                ));
            }
        }
    }
}

impl Default for TakeoffController {
    fn default() -> Self {
        Self::new()
    }
}
