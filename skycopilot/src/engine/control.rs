//! Feedback-control primitives.
//!
//! Every axis deflection the rule engine commands comes from these
//! controllers. Sign conventions, fixed by the downstream bridge and
//! exercised end-to-end by the takeoff tests:
//!
//! - negative elevator = nose up
//! - positive aileron = roll left
//! - positive rudder = left yaw
//!
//! Deflections are percent of full travel in `[-100, 100]`.

use std::time::{Duration, Instant};

use crate::geo::heading_error;
use crate::profile::AircraftProfile;
use crate::telemetry::TelemetrySnapshot;

/// Proportional gain when the effective deflection budget is wide.
const PITCH_P_GAIN_HIGH: f64 = 3.0;

/// Proportional gain for a tight deflection budget.
const PITCH_P_GAIN_LOW: f64 = 2.0;

/// Deflection budget above which the high gain applies.
const PITCH_HIGH_GAIN_THRESHOLD: f64 = 40.0;

/// Derivative gain on pitch rate.
const PITCH_D_GAIN: f64 = 0.5;

/// Floor on the airspeed-based deflection attenuation.
const PITCH_SPEED_FLOOR: f64 = 0.5;

/// AGL below which speed scheduling is disabled (feet).
const PITCH_SPEED_SCHED_MIN_AGL_FT: f64 = 200.0;

/// Margin under the pitch limit where the emergency push engages (degrees).
const EMERGENCY_PUSH_MARGIN_DEG: f64 = 3.0;

/// Gain of the progressive emergency push.
const EMERGENCY_PUSH_GAIN: f64 = 1.5;

/// Clamp widening while the emergency push is active.
const EMERGENCY_PUSH_EXTRA_DEFLECTION: f64 = 20.0;

/// Pitch target change per knot of speed error.
const PITCH_PER_KNOT_DEG: f64 = 0.5;

/// Fixed aileron counter-bias against engine torque during takeoff.
const TORQUE_COUNTER_BIAS_PCT: f64 = -2.5;

/// Fixed right-rudder bias against P-factor at high power.
const P_FACTOR_RUDDER_BIAS_PCT: f64 = -5.0;

/// Throttle above which the torque and P-factor biases apply, percent.
const HIGH_POWER_THROTTLE_PCT: f64 = 50.0;

/// Ground-steer deadband on heading error (degrees).
const STEER_DEADBAND_DEG: f64 = 1.0;

/// Roll-bias accumulation gain per tick.
const ROLL_BIAS_ACCUM_GAIN: f64 = 0.02;

/// Roll-bias decay factor per tick.
const ROLL_BIAS_DECAY: f64 = 0.97;

/// Roll-bias bound, percent aileron.
const ROLL_BIAS_LIMIT_PCT: f64 = 20.0;

/// Pitch controller with density and speed scheduling.
///
/// Holds the previous pitch sample for the derivative term; one instance
/// per control loop, reset on phase change.
#[derive(Debug)]
pub struct PitchController {
    last_pitch: Option<(f64, Instant)>,
    /// Minimum pitch target enforced while climbing out, degrees.
    pub min_climb_pitch_deg: Option<f64>,
}

impl PitchController {
    /// Create a controller with no history.
    pub fn new() -> Self {
        Self {
            last_pitch: None,
            min_climb_pitch_deg: None,
        }
    }

    /// Forget controller history (phase boundary).
    pub fn reset(&mut self) {
        self.last_pitch = None;
        self.min_climb_pitch_deg = None;
    }

    /// Elevator deflection tracking a pitch target.
    ///
    /// PD on pitch with the deflection budget scheduled by air density
    /// (altitude) and indicated airspeed, and a progressive emergency push
    /// near the nose-up pitch limit.
    pub fn target_pitch(
        &mut self,
        pitch_target_deg: f64,
        max_deflection: f64,
        snapshot: &TelemetrySnapshot,
        profile: &AircraftProfile,
        now: Instant,
    ) -> f64 {
        let density_factor = 1.0 + snapshot.altitude_msl.max(0.0) / 30_000.0;

        let speed_factor = if snapshot.airspeed <= profile.speeds.vr
            || snapshot.altitude_agl <= PITCH_SPEED_SCHED_MIN_AGL_FT
        {
            1.0
        } else {
            (profile.speeds.vr / snapshot.airspeed).max(PITCH_SPEED_FLOOR)
        };

        let effective_max = max_deflection * density_factor * speed_factor;
        let gain = if effective_max > PITCH_HIGH_GAIN_THRESHOLD {
            PITCH_P_GAIN_HIGH
        } else {
            PITCH_P_GAIN_LOW
        };

        // Negative elevator = nose up
        let p_term = -(pitch_target_deg - snapshot.pitch) * gain;

        let d_term = match self.last_pitch {
            Some((prev_pitch, prev_time)) => {
                let dt = now
                    .duration_since(prev_time)
                    .max(Duration::from_millis(50))
                    .min(Duration::from_secs(1))
                    .as_secs_f64();
                (snapshot.pitch - prev_pitch) / dt * PITCH_D_GAIN
            }
            None => 0.0,
        };
        self.last_pitch = Some((snapshot.pitch, now));

        let mut output = p_term + d_term;
        let mut clamp = effective_max;

        // Progressive push as pitch closes on the structural limit
        let push_threshold = profile.limits.max_pitch_up_deg - EMERGENCY_PUSH_MARGIN_DEG;
        if snapshot.pitch > push_threshold {
            output += (snapshot.pitch - push_threshold) * EMERGENCY_PUSH_GAIN;
            clamp += EMERGENCY_PUSH_EXTRA_DEFLECTION;
        }

        output.clamp(-clamp, clamp)
    }

    /// Elevator deflection holding a target airspeed by pitch.
    ///
    /// Speed error converts to a pitch target at 0.5°/kt inside [-5°, +15°];
    /// the climb-out floor applies when set.
    pub fn pitch_for_speed(
        &mut self,
        target_speed_kt: f64,
        max_deflection: f64,
        snapshot: &TelemetrySnapshot,
        profile: &AircraftProfile,
        now: Instant,
    ) -> f64 {
        let speed_error = snapshot.airspeed - target_speed_kt;
        let mut pitch_target = (speed_error * PITCH_PER_KNOT_DEG).clamp(-5.0, 15.0);

        if let Some(floor) = self.min_climb_pitch_deg {
            pitch_target = pitch_target.max(floor);
        }

        self.target_pitch(pitch_target, max_deflection, snapshot, profile, now)
    }
}

impl Default for PitchController {
    fn default() -> Self {
        Self::new()
    }
}

/// Aileron deflection tracking a bank target.
///
/// Adaptive gain grows with the error; the accumulated roll bias and, at
/// takeoff power, a fixed torque counter-bias are folded in.
pub fn target_bank(
    bank_target_deg: f64,
    max_deflection: f64,
    snapshot: &TelemetrySnapshot,
    roll_bias_pct: f64,
    takeoff_power: bool,
) -> f64 {
    let error = bank_target_deg - snapshot.bank;
    let gain = 2.0 + (error.abs() / 15.0).min(1.0) * 2.0;

    // Positive aileron = roll left, so a right-bank demand is negative
    let mut aileron = -error * gain + roll_bias_pct;

    if takeoff_power && snapshot.throttle_pct > HIGH_POWER_THROTTLE_PCT {
        aileron += TORQUE_COUNTER_BIAS_PCT;
    }

    aileron.clamp(-max_deflection, max_deflection)
}

/// Aileron deflection turning toward a heading.
///
/// Heading error maps to a bank target at 2°/° clamped to ±15° and the
/// profile bank limit, then [`target_bank`] tracks it.
pub fn bank_to_heading(
    target_heading_deg: f64,
    max_bank_deg: f64,
    max_deflection: f64,
    snapshot: &TelemetrySnapshot,
    roll_bias_pct: f64,
) -> f64 {
    let error = heading_error(snapshot.heading, target_heading_deg);
    let bank_limit = max_bank_deg.min(15.0);
    // Positive bank = right wing down, toward a rightward target
    let bank_target = (error * 2.0).clamp(-bank_limit, bank_limit);

    target_bank(bank_target, max_deflection, snapshot, roll_bias_pct, false)
}

/// Ground-steering output: rudder plus differential brakes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroundSteer {
    /// Rudder deflection, percent; positive = left yaw.
    pub rudder: f64,
    /// Left brake application, percent.
    pub left_brake: f64,
    /// Right brake application, percent.
    pub right_brake: f64,
}

/// Ground-steering regime; selects gains and brake limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerRegime {
    /// Taxiing: brakes assist only fine corrections.
    Taxi,
    /// Takeoff roll: full rudder authority, light braking.
    TakeoffRoll,
}

/// Rudder-and-brake composite steering toward a ground heading.
pub fn ground_steer(
    target_heading_deg: f64,
    regime: SteerRegime,
    snapshot: &TelemetrySnapshot,
) -> GroundSteer {
    let error = heading_error(snapshot.heading, target_heading_deg);

    // Rudder authority shrinks with ground speed
    let gain = (30.0 / (snapshot.ground_speed + 5.0)).clamp(0.5, 3.0);
    let max_deflection = if snapshot.ground_speed < 10.0 || regime == SteerRegime::TakeoffRoll {
        100.0
    } else {
        40.0
    };

    // Positive rudder = left yaw, so a rightward error steers negative
    let mut rudder = if error.abs() < STEER_DEADBAND_DEG {
        0.0
    } else {
        -error * gain
    };

    if snapshot.throttle_pct > HIGH_POWER_THROTTLE_PCT {
        rudder += P_FACTOR_RUDDER_BIAS_PCT;
    }
    let rudder = rudder.clamp(-max_deflection, max_deflection);

    let (mut left_brake, mut right_brake) = (0.0, 0.0);
    if snapshot.on_ground() {
        match regime {
            SteerRegime::Taxi => {
                // Brakes only for the fine-correction band, never hard turns
                if error.abs() > 15.0 && error.abs() < 30.0 && snapshot.ground_speed > 2.0 {
                    let strength = (error.abs() - 15.0) / 15.0 * 30.0;
                    if error > 0.0 {
                        right_brake = strength;
                    } else {
                        left_brake = strength;
                    }
                }
            }
            SteerRegime::TakeoffRoll => {
                if snapshot.ground_speed < 30.0 && error.abs() > 8.0 {
                    let strength = ((error.abs() - 8.0) / 20.0 * 15.0).min(15.0);
                    if error > 0.0 {
                        right_brake = strength;
                    } else {
                        left_brake = strength;
                    }
                }
            }
        }
    }

    GroundSteer {
        rudder,
        left_brake,
        right_brake,
    }
}

/// Slow estimator of the steady-state aileron needed to hold wings level.
///
/// Accumulates against the observed bank at high power and decays toward
/// zero, bounded to ±20%. Sampled after liftoff to pre-trim the wings-level
/// loop.
#[derive(Debug, Default)]
pub struct RollBiasEstimator {
    bias_pct: f64,
}

impl RollBiasEstimator {
    /// Create a zeroed estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tick of bank and power.
    pub fn update(&mut self, bank_deg: f64, throttle_pct: f64) {
        let power_factor = (throttle_pct / 100.0).clamp(0.0, 1.0);
        self.bias_pct += -bank_deg * ROLL_BIAS_ACCUM_GAIN * power_factor;
        self.bias_pct *= ROLL_BIAS_DECAY;
        self.bias_pct = self.bias_pct.clamp(-ROLL_BIAS_LIMIT_PCT, ROLL_BIAS_LIMIT_PCT);
    }

    /// Current bias, percent aileron.
    pub fn value(&self) -> f64 {
        self.bias_pct
    }

    /// Zero the estimator.
    pub fn reset(&mut self) {
        self.bias_pct = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            airspeed: 70.0,
            altitude_msl: 1000.0,
            altitude_agl: 400.0,
            ..Default::default()
        }
    }

    fn profile() -> AircraftProfile {
        AircraftProfile::cessna_172()
    }

    #[test]
    fn test_pitch_up_demand_gives_negative_elevator() {
        let mut ctrl = PitchController::new();
        let snap = snapshot();
        let elevator = ctrl.target_pitch(7.5, 30.0, &snap, &profile(), Instant::now());
        assert!(elevator < 0.0, "nose-up must be negative, got {}", elevator);
    }

    #[test]
    fn test_pitch_down_demand_gives_positive_elevator() {
        let mut ctrl = PitchController::new();
        let mut snap = snapshot();
        snap.pitch = 10.0;
        let elevator = ctrl.target_pitch(2.0, 30.0, &snap, &profile(), Instant::now());
        assert!(elevator > 0.0, "nose-down must be positive, got {}", elevator);
    }

    #[test]
    fn test_pitch_output_respects_clamp() {
        let mut ctrl = PitchController::new();
        let mut snap = snapshot();
        snap.pitch = -20.0;
        let elevator = ctrl.target_pitch(15.0, 25.0, &snap, &profile(), Instant::now());
        // Effective max at 1000 ft, slow: 25 * ~1.03
        assert!(elevator.abs() <= 26.0);
    }

    #[test]
    fn test_speed_scheduling_attenuates_at_speed() {
        let mut slow_ctrl = PitchController::new();
        let mut fast_ctrl = PitchController::new();
        let now = Instant::now();

        let mut slow = snapshot();
        slow.airspeed = 55.0;
        slow.altitude_agl = 1000.0;

        let mut fast = slow.clone();
        fast.airspeed = 140.0;

        let slow_out = slow_ctrl.target_pitch(10.0, 30.0, &slow, &profile(), now);
        let fast_out = fast_ctrl.target_pitch(10.0, 30.0, &fast, &profile(), now);
        assert!(
            fast_out.abs() < slow_out.abs(),
            "deflection must shrink with speed: slow {} fast {}",
            slow_out,
            fast_out
        );
    }

    #[test]
    fn test_derivative_damps_rising_pitch() {
        let mut ctrl = PitchController::new();
        let base = Instant::now();
        let prof = profile();

        let mut snap = snapshot();
        snap.pitch = 0.0;
        let first = ctrl.target_pitch(8.0, 30.0, &snap, &prof, base);

        // Pitch rising fast toward the target: D-term opposes (more
        // positive) even though the P error shrank
        snap.pitch = 6.0;
        let second = ctrl.target_pitch(8.0, 30.0, &snap, &prof, base + Duration::from_millis(100));
        assert!(second > first, "damping must relax the pull: {} -> {}", first, second);
    }

    #[test]
    fn test_emergency_push_near_pitch_limit() {
        let mut ctrl = PitchController::new();
        let prof = profile();
        let mut snap = snapshot();
        // Above max_pitch_up (15) - 3 = 12 threshold
        snap.pitch = 14.0;

        let elevator = ctrl.target_pitch(14.0, 30.0, &snap, &prof, Instant::now());
        // Zero P error, but the push drives nose-down
        assert!(elevator > 0.0, "expected push, got {}", elevator);
    }

    #[test]
    fn test_pitch_for_speed_converts_error() {
        let mut ctrl = PitchController::new();
        let prof = profile();
        let now = Instant::now();

        // 20 kt fast: pitch target +10, strong nose-up demand
        let mut fast = snapshot();
        fast.airspeed = prof.speeds.vy + 20.0;
        fast.pitch = 0.0;
        let out = ctrl.pitch_for_speed(prof.speeds.vy, 30.0, &fast, &prof, now);
        assert!(out < -5.0, "fast must pitch up, got {}", out);
    }

    #[test]
    fn test_pitch_for_speed_climb_floor() {
        let mut ctrl = PitchController::new();
        ctrl.min_climb_pitch_deg = Some(4.0);
        let prof = profile();

        // 30 kt slow would want pitch -5; the climb floor keeps +4
        let mut slow = snapshot();
        slow.airspeed = prof.speeds.vy - 30.0;
        slow.pitch = 4.0;
        let out = ctrl.pitch_for_speed(prof.speeds.vy, 30.0, &slow, &prof, Instant::now());
        // Target equals current pitch, so output stays near zero rather
        // than diving
        assert!(out.abs() < 5.0, "floor must hold the nose, got {}", out);
    }

    #[test]
    fn test_target_bank_sign_convention() {
        let snap = snapshot();
        // Demand right bank: negative aileron
        let right = target_bank(15.0, 30.0, &snap, 0.0, false);
        assert!(right < 0.0);
        // Demand left bank: positive aileron
        let left = target_bank(-15.0, 30.0, &snap, 0.0, false);
        assert!(left > 0.0);
    }

    #[test]
    fn test_target_bank_adaptive_gain() {
        let snap = snapshot();
        let small = target_bank(5.0, 100.0, &snap, 0.0, false);
        let large = target_bank(20.0, 100.0, &snap, 0.0, false);
        // Gain grows with error, so 4x error gives more than 4x deflection
        assert!(large.abs() > small.abs() * 4.0);
    }

    #[test]
    fn test_torque_counter_bias_at_takeoff_power() {
        let mut snap = snapshot();
        snap.throttle_pct = 100.0;
        let with_bias = target_bank(0.0, 30.0, &snap, 0.0, true);
        let without = target_bank(0.0, 30.0, &snap, 0.0, false);
        assert!(with_bias < without);
    }

    #[test]
    fn test_bank_to_heading_turns_toward_target() {
        let mut snap = snapshot();
        snap.heading = 90.0;
        // Target right of current: right bank demand, negative aileron
        let aileron = bank_to_heading(120.0, 30.0, 40.0, &snap, 0.0);
        assert!(aileron < 0.0);

        // Target left of current
        let aileron = bank_to_heading(60.0, 30.0, 40.0, &snap, 0.0);
        assert!(aileron > 0.0);
    }

    #[test]
    fn test_ground_steer_sign_and_deadband() {
        let mut snap = snapshot();
        snap.raw_on_ground = true;
        snap.altitude_agl = 0.0;
        snap.vertical_speed = 0.0;
        snap.ground_speed = 15.0;
        snap.heading = 160.0;

        // Target right of heading: negative rudder (right yaw)
        let steer = ground_steer(175.0, SteerRegime::Taxi, &snap);
        assert!(steer.rudder < 0.0);

        // Inside the deadband: no correction
        snap.heading = 174.6;
        let steer = ground_steer(175.0, SteerRegime::Taxi, &snap);
        assert_eq!(steer.rudder, 0.0);
    }

    #[test]
    fn test_ground_steer_gain_shrinks_with_speed() {
        let mut snap = snapshot();
        snap.raw_on_ground = true;
        snap.altitude_agl = 0.0;
        snap.vertical_speed = 0.0;
        snap.heading = 170.0;

        snap.ground_speed = 3.0;
        let slow = ground_steer(180.0, SteerRegime::Taxi, &snap);

        snap.ground_speed = 35.0;
        let fast = ground_steer(180.0, SteerRegime::Taxi, &snap);

        assert!(slow.rudder.abs() > fast.rudder.abs());
    }

    #[test]
    fn test_taxi_brakes_only_in_fine_correction_band() {
        let mut snap = snapshot();
        snap.raw_on_ground = true;
        snap.altitude_agl = 0.0;
        snap.vertical_speed = 0.0;
        snap.ground_speed = 10.0;
        snap.heading = 180.0;

        // 20° right error: right brake assists
        let fine = ground_steer(200.0, SteerRegime::Taxi, &snap);
        assert!(fine.right_brake > 0.0);
        assert_eq!(fine.left_brake, 0.0);

        // 60° error: a large turn, rudder only
        let large = ground_steer(240.0, SteerRegime::Taxi, &snap);
        assert_eq!(large.right_brake, 0.0);
        assert_eq!(large.left_brake, 0.0);

        // 5° error: below the band
        let small = ground_steer(185.0, SteerRegime::Taxi, &snap);
        assert_eq!(small.right_brake, 0.0);
    }

    #[test]
    fn test_p_factor_bias_at_high_power() {
        let mut snap = snapshot();
        snap.raw_on_ground = true;
        snap.altitude_agl = 0.0;
        snap.vertical_speed = 0.0;
        snap.ground_speed = 20.0;
        snap.heading = 160.0;
        snap.throttle_pct = 100.0;

        // Zero heading error: only the right-rudder bias remains
        let steer = ground_steer(160.0, SteerRegime::TakeoffRoll, &snap);
        assert!(steer.rudder < 0.0);
    }

    #[test]
    fn test_roll_bias_accumulates_and_decays() {
        let mut estimator = RollBiasEstimator::new();

        // Persistent left bank at full power accumulates a positive
        // opposing bias
        for _ in 0..50 {
            estimator.update(-5.0, 100.0);
        }
        let built = estimator.value();
        assert!(built > 0.5, "bias must accumulate, got {}", built);
        assert!(built <= 20.0);

        // Level wings at idle: decays toward zero
        for _ in 0..200 {
            estimator.update(0.0, 0.0);
        }
        assert!(estimator.value().abs() < 0.1);
    }

    #[test]
    fn test_roll_bias_bounded() {
        let mut estimator = RollBiasEstimator::new();
        for _ in 0..10_000 {
            estimator.update(-45.0, 100.0);
        }
        assert!(estimator.value() <= 20.0);
    }
}
