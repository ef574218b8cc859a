//! Dynamic flight envelope calculation.
//!
//! Stall and maneuvering speeds move with weight and load factor; the
//! envelope snapshot gives the rule engine the speeds that actually apply
//! this tick instead of the static book numbers.
//!
//! The snapshot is derived from the current tick's telemetry only; there is
//! no cross-tick fusion.

use crate::profile::AircraftProfile;
use crate::telemetry::TelemetrySnapshot;

/// Bank angle magnitude beyond which the load factor is no longer computed
/// from 1/cos(bank); past this the number stops being meaningful guidance.
const LOAD_FACTOR_BANK_CAP_DEG: f64 = 75.0;

/// Ceiling on the computed load factor (1/cos(75°) ≈ 3.86).
const LOAD_FACTOR_MAX: f64 = 4.0;

/// Per-tick flight envelope snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightEnvelope {
    /// Estimated aircraft weight in pounds.
    pub weight_lb: f64,
    /// Load factor from bank angle (1/cos), clamped.
    pub load_factor: f64,
    /// Dynamic clean stall speed, knots.
    pub vs1_dynamic: f64,
    /// Dynamic landing-config stall speed, knots.
    pub vs0_dynamic: f64,
    /// Stall speed active for the current flap configuration, knots.
    pub vs_active: f64,
    /// Dynamic maneuvering speed, knots.
    pub va_dynamic: f64,
    /// IAS margin above the active stall speed, knots (negative = stalled).
    pub stall_margin: f64,
    /// Margin below Vne, knots (negative = overspeed).
    pub overspeed_margin: f64,
}

impl FlightEnvelope {
    /// Compute the envelope for the current tick.
    pub fn compute(profile: &AircraftProfile, snapshot: &TelemetrySnapshot) -> Self {
        let weight_lb = profile.estimated_weight_lb();
        let weight_ratio = (weight_lb / profile.weight.max_gross_lb).clamp(0.0, 1.0);
        let weight_scale = weight_ratio.sqrt();

        let load_factor = load_factor_for_bank(snapshot.bank);
        let load_scale = load_factor.sqrt();

        let vs1_dynamic = profile.speeds.vs1 * weight_scale * load_scale;
        let vs0_dynamic = profile.speeds.vs0 * weight_scale * load_scale;

        // Any flap extension moves the reference to the landing-config speed
        let vs_active = if snapshot.flaps_index > 0 {
            vs0_dynamic
        } else {
            vs1_dynamic
        };

        let va_dynamic = profile.speeds.va * weight_scale;

        Self {
            weight_lb,
            load_factor,
            vs1_dynamic,
            vs0_dynamic,
            vs_active,
            va_dynamic,
            stall_margin: snapshot.airspeed - vs_active,
            overspeed_margin: profile.speeds.vne - snapshot.airspeed,
        }
    }
}

/// Load factor n = 1/cos(bank), clamped for steep banks.
fn load_factor_for_bank(bank_deg: f64) -> f64 {
    let bank = bank_deg.abs().min(LOAD_FACTOR_BANK_CAP_DEG);
    (1.0 / bank.to_radians().cos()).min(LOAD_FACTOR_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(airspeed: f64, bank: f64, flaps: u8) -> TelemetrySnapshot {
        TelemetrySnapshot {
            airspeed,
            bank,
            flaps_index: flaps,
            ..Default::default()
        }
    }

    #[test]
    fn test_level_flight_load_factor_is_one() {
        let profile = AircraftProfile::cessna_172();
        let env = FlightEnvelope::compute(&profile, &snapshot(100.0, 0.0, 0));
        assert!((env.load_factor - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sixty_degree_bank_doubles_load_factor() {
        let profile = AircraftProfile::cessna_172();
        let env = FlightEnvelope::compute(&profile, &snapshot(100.0, 60.0, 0));
        assert!((env.load_factor - 2.0).abs() < 0.01);
        // Stall speed grows with sqrt(n)
        let level = FlightEnvelope::compute(&profile, &snapshot(100.0, 0.0, 0));
        assert!((env.vs1_dynamic / level.vs1_dynamic - 2.0_f64.sqrt()).abs() < 0.01);
    }

    #[test]
    fn test_flaps_select_landing_config_stall_speed() {
        let profile = AircraftProfile::cessna_172();
        let clean = FlightEnvelope::compute(&profile, &snapshot(80.0, 0.0, 0));
        let flapped = FlightEnvelope::compute(&profile, &snapshot(80.0, 0.0, 2));
        assert_eq!(clean.vs_active, clean.vs1_dynamic);
        assert_eq!(flapped.vs_active, flapped.vs0_dynamic);
        assert!(flapped.vs_active < clean.vs_active);
    }

    #[test]
    fn test_below_gross_weight_lowers_stall_speed() {
        let profile = AircraftProfile::cessna_172();
        let env = FlightEnvelope::compute(&profile, &snapshot(80.0, 0.0, 0));
        // Default loading is below max gross, so dynamic Vs1 < book Vs1
        assert!(env.weight_lb < profile.weight.max_gross_lb);
        assert!(env.vs1_dynamic < profile.speeds.vs1);
        assert!(env.va_dynamic < profile.speeds.va);
    }

    #[test]
    fn test_margins() {
        let profile = AircraftProfile::cessna_172();
        let env = FlightEnvelope::compute(&profile, &snapshot(100.0, 0.0, 0));
        assert!((env.stall_margin - (100.0 - env.vs_active)).abs() < 1e-9);
        assert!((env.overspeed_margin - (profile.speeds.vne - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_bank_is_clamped() {
        let profile = AircraftProfile::cessna_172();
        let env = FlightEnvelope::compute(&profile, &snapshot(100.0, 89.9, 0));
        assert!(env.load_factor <= LOAD_FACTOR_MAX);
        assert!(env.vs1_dynamic.is_finite());
    }

    proptest! {
        /// Dynamic stall speed never drops below the book number scaled to
        /// the lightest credible weight, and is always non-negative.
        #[test]
        fn prop_vs_active_lower_bound(bank in -89.0_f64..89.0, airspeed in 0.0_f64..200.0, flaps in 0u8..4) {
            let profile = AircraftProfile::cessna_172();
            let env = FlightEnvelope::compute(&profile, &snapshot(airspeed, bank, flaps));

            let floor_ref = if flaps > 0 { profile.speeds.vs0 } else { profile.speeds.vs1 };
            let min_scale = (profile.weight.empty_lb / profile.weight.max_gross_lb).sqrt();

            prop_assert!(env.vs_active >= 0.0);
            prop_assert!(env.vs_active >= floor_ref * min_scale - 1e-9);
        }

        /// Load factor is monotonic in |bank| and bounded.
        #[test]
        fn prop_load_factor_bounds(bank in -179.0_f64..179.0) {
            let n = load_factor_for_bank(bank);
            prop_assert!(n >= 1.0 - 1e-12);
            prop_assert!(n <= LOAD_FACTOR_MAX);
        }
    }
}
