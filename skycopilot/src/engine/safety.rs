//! Flight-envelope protection bands.
//!
//! Runs every airborne tick after the phase handler. Each band watches one
//! way the aircraft can leave the safe envelope (bank, stall, overspeed,
//! pitch, runaway vertical speed, altitude drift) and emits corrective
//! commands. Because the queue collapses same-kind commands keeping the
//! newest, protections emitted here override whatever the phase handler
//! asked for.
//!
//! Stall checks use the dynamic envelope speeds, never the static book
//! numbers.

use tracing::warn;

use crate::command::{Command, CommandKind};
use crate::envelope::FlightEnvelope;
use crate::phase::FlightPhase;
use crate::profile::AircraftProfile;
use crate::telemetry::TelemetrySnapshot;

use super::ApState;

/// Bank magnitude treated as critical, degrees.
const BANK_CRITICAL_DEG: f64 = 45.0;

/// Critical bank when low with nobody holding the wings, degrees.
const BANK_CRITICAL_LOW_NO_AP_DEG: f64 = 30.0;

/// Bank magnitude treated as dangerous, degrees.
const BANK_DANGER_DEG: f64 = 35.0;

/// Danger bank when low with nobody holding the wings, degrees.
const BANK_DANGER_LOW_NO_AP_DEG: f64 = 25.0;

/// AGL under which the tightened bank thresholds apply, feet.
const LOW_ALTITUDE_AGL_FT: f64 = 1000.0;

/// Stall-protect margin over the active stall speed, knots.
const STALL_PROTECT_MARGIN_KT: f64 = 5.0;

/// Stall-warning margin over the active stall speed, knots.
const STALL_WARN_MARGIN_KT: f64 = 10.0;

/// Margin under Vne where overspeed protection engages, knots.
const OVERSPEED_MARGIN_KT: f64 = 5.0;

/// Grace band outside the commanded-VS limits before clamping, fpm.
const VS_LIMIT_GRACE_FPM: f64 = 200.0;

/// Altitude deviation in cruise that triggers a correction, feet.
const ALT_DEVIATION_FT: f64 = 200.0;

/// Correction rate for cruise altitude deviations, fpm.
const ALT_CORRECTION_VS_FPM: f64 = 300.0;

/// Most severe envelope condition this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EnvelopeAlert {
    /// Envelope clean.
    #[default]
    None,
    /// Bank approaching the limit.
    BankDanger,
    /// Stall margin shrinking.
    StallWarn,
    /// Pitch outside limits.
    Pitch,
    /// Approaching Vne.
    Overspeed,
    /// Bank past the critical limit.
    Bank,
    /// Inside the stall-protect margin.
    Stall,
}

impl std::fmt::Display for EnvelopeAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnvelopeAlert::None => "none",
            EnvelopeAlert::BankDanger => "bank-danger",
            EnvelopeAlert::StallWarn => "stall-warning",
            EnvelopeAlert::Pitch => "pitch",
            EnvelopeAlert::Overspeed => "overspeed",
            EnvelopeAlert::Bank => "bank",
            EnvelopeAlert::Stall => "stall",
        };
        write!(f, "{}", name)
    }
}

/// Run every protection band; returns the most severe alert raised.
pub fn run_protections(
    snapshot: &TelemetrySnapshot,
    envelope: &FlightEnvelope,
    ap: &ApState,
    profile: &AircraftProfile,
    phase: FlightPhase,
    out: &mut Vec<Command>,
) -> EnvelopeAlert {
    let mut alert = EnvelopeAlert::None;

    // Thresholds tighten when nothing is holding the wings down low
    let ap_manages_bank = ap.master && (ap.hdg_hold || ap.nav_hold || ap.apr_hold);
    let tightened = !ap_manages_bank && snapshot.altitude_agl < LOW_ALTITUDE_AGL_FT;

    let critical_bank = if tightened {
        BANK_CRITICAL_LOW_NO_AP_DEG
    } else {
        BANK_CRITICAL_DEG
    };
    let danger_bank = if tightened {
        BANK_DANGER_LOW_NO_AP_DEG
    } else {
        BANK_DANGER_DEG
    };

    let bank_magnitude = snapshot.bank.abs();

    if bank_magnitude > critical_bank {
        warn!(bank = snapshot.bank, "Critical bank, leveling wings");
        alert = alert.max(EnvelopeAlert::Bank);

        out.push(
            Command::set_value(
                CommandKind::HeadingBugSet,
                snapshot.heading.round(),
                "level wings on current heading",
            )
            .with_high_priority(),
        );
        out.push(Command::toggle(CommandKind::ApHdgHold, true, "heading hold for recovery"));

        if !ap.master {
            let aileron = (-snapshot.bank * 0.8).clamp(-30.0, 30.0);
            out.push(Command::axis(CommandKind::AxisAileronsSet, aileron, "bank recovery"));
        }
    } else if bank_magnitude > danger_bank {
        alert = alert.max(EnvelopeAlert::BankDanger);

        // Walk the bug halfway back toward the nose
        let nudged = ap.selected_heading_deg
            + crate::geo::heading_error(ap.selected_heading_deg, snapshot.heading) / 2.0;
        out.push(Command::set_value(
            CommandKind::HeadingBugSet,
            crate::geo::normalize_heading(nudged).round(),
            "shallow the turn",
        ));
    }

    // Stall bands use the dynamic speeds
    if envelope.stall_margin < STALL_PROTECT_MARGIN_KT {
        warn!(
            airspeed = snapshot.airspeed,
            vs_active = envelope.vs_active,
            "Stall protection active"
        );
        alert = alert.max(EnvelopeAlert::Stall);

        out.push(
            Command::set_value(CommandKind::ThrottleSet, 100.0, "stall recovery power")
                .with_high_priority(),
        );

        let vs_cmd = if snapshot.airspeed > envelope.vs_active {
            -200.0
        } else {
            -500.0
        };
        out.push(Command::set_value(CommandKind::ApVsVarSet, vs_cmd, "lower the nose"));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold for recovery"));

        if bank_magnitude > 20.0 {
            out.push(Command::set_value(
                CommandKind::HeadingBugSet,
                snapshot.heading.round(),
                "wings level in stall recovery",
            ));
            out.push(Command::toggle(CommandKind::ApHdgHold, true, "heading hold"));
        }
    } else if envelope.stall_margin < STALL_WARN_MARGIN_KT {
        alert = alert.max(EnvelopeAlert::StallWarn);

        if snapshot.vertical_speed < -200.0 {
            out.push(Command::set_value(CommandKind::ApVsVarSet, -200.0, "reduce descent"));
        }
        if bank_magnitude > 25.0 {
            let nudged = ap.selected_heading_deg
                + crate::geo::heading_error(ap.selected_heading_deg, snapshot.heading) / 2.0;
            out.push(Command::set_value(
                CommandKind::HeadingBugSet,
                crate::geo::normalize_heading(nudged).round(),
                "shallow the turn near stall",
            ));
        }
    }

    // Overspeed
    if envelope.overspeed_margin < OVERSPEED_MARGIN_KT {
        warn!(airspeed = snapshot.airspeed, "Overspeed protection active");
        alert = alert.max(EnvelopeAlert::Overspeed);

        out.push(
            Command::set_value(CommandKind::ThrottleSet, 50.0, "overspeed recovery")
                .with_high_priority(),
        );
        if snapshot.vertical_speed < -300.0 {
            out.push(Command::set_value(CommandKind::ApVsVarSet, -200.0, "arrest the dive"));
        }
    } else if snapshot.airspeed > profile.speeds.vno && phase != FlightPhase::Descent {
        // Proportional pull-back above Vno outside a planned descent
        let reduced =
            (snapshot.throttle_pct - (snapshot.airspeed - profile.speeds.vno) * 2.0).clamp(30.0, 100.0);
        out.push(Command::set_value(CommandKind::ThrottleSet, reduced, "slow below Vno"));
    }

    // Pitch limits
    if snapshot.pitch > profile.limits.max_pitch_up_deg {
        alert = alert.max(EnvelopeAlert::Pitch);
        out.push(Command::set_value(
            CommandKind::ApVsVarSet,
            ALT_CORRECTION_VS_FPM.min(profile.limits.max_vs_fpm),
            "pitch limit, level off",
        ));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
    } else if snapshot.pitch < profile.limits.max_pitch_down_deg {
        alert = alert.max(EnvelopeAlert::Pitch);
        out.push(Command::set_value(
            CommandKind::ApVsVarSet,
            (-ALT_CORRECTION_VS_FPM).max(profile.limits.min_vs_fpm),
            "pitch limit, raise the nose",
        ));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
    }

    // Runaway vertical speed
    if snapshot.vertical_speed < profile.limits.min_vs_fpm - VS_LIMIT_GRACE_FPM
        || snapshot.vertical_speed > profile.limits.max_vs_fpm + VS_LIMIT_GRACE_FPM
    {
        let clamped = snapshot
            .vertical_speed
            .clamp(profile.limits.min_vs_fpm, profile.limits.max_vs_fpm);
        out.push(Command::set_value(CommandKind::ApVsVarSet, clamped, "vertical speed limit"));
        out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
    }

    // Altitude drift in cruise
    if phase == FlightPhase::Cruise {
        let deviation = snapshot.altitude_msl - ap.selected_altitude_ft;
        if deviation.abs() > ALT_DEVIATION_FT {
            let vs = if deviation > 0.0 {
                -ALT_CORRECTION_VS_FPM
            } else {
                ALT_CORRECTION_VS_FPM
            };
            out.push(Command::set_value(CommandKind::ApVsVarSet, vs, "recapture cruise altitude"));
            out.push(Command::toggle(CommandKind::ApVsHold, true, "vs hold"));
        }
    }

    alert
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandValue;

    fn profile() -> AircraftProfile {
        AircraftProfile::cessna_172()
    }

    fn ap_on() -> ApState {
        ApState {
            master: true,
            hdg_hold: true,
            selected_altitude_ft: 5500.0,
            selected_heading_deg: 90.0,
            ..Default::default()
        }
    }

    fn run(snap: &TelemetrySnapshot, ap: &ApState, phase: FlightPhase) -> (EnvelopeAlert, Vec<Command>) {
        let prof = profile();
        let envelope = FlightEnvelope::compute(&prof, snap);
        let mut out = Vec::new();
        let alert = run_protections(snap, &envelope, ap, &prof, phase, &mut out);
        (alert, out)
    }

    fn find_value(commands: &[Command], kind: CommandKind) -> Option<f64> {
        commands
            .iter()
            .rev()
            .find(|c| c.kind == kind)
            .and_then(|c| c.value.as_number())
    }

    #[test]
    fn test_bank_critical_recovery() {
        // Bank 47° at 3000 AGL with AP+HDG engaged
        let snap = TelemetrySnapshot {
            bank: 47.0,
            heading: 88.6,
            altitude_agl: 3000.0,
            altitude_msl: 5600.0,
            airspeed: 105.0,
            vertical_speed: -200.0,
            ..Default::default()
        };

        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Cruise);
        assert_eq!(alert, EnvelopeAlert::Bank);

        assert_eq!(find_value(&out, CommandKind::HeadingBugSet), Some(89.0));
        assert!(out
            .iter()
            .any(|c| c.kind == CommandKind::ApHdgHold && c.value == CommandValue::Bool(true)));
        // VS -200 is inside the grace band: no VS command
        assert!(find_value(&out, CommandKind::ApVsVarSet).is_none());
        // AP is flying: no manual aileron
        assert!(!out.iter().any(|c| c.kind == CommandKind::AxisAileronsSet));
    }

    #[test]
    fn test_bank_critical_manual_aileron_when_ap_off() {
        let snap = TelemetrySnapshot {
            bank: 50.0,
            heading: 180.0,
            altitude_agl: 3000.0,
            altitude_msl: 4000.0,
            airspeed: 100.0,
            ..Default::default()
        };

        let ap = ApState::default();
        let (alert, out) = run(&snap, &ap, FlightPhase::Cruise);
        assert_eq!(alert, EnvelopeAlert::Bank);

        let aileron = find_value(&out, CommandKind::AxisAileronsSet).unwrap();
        // Right bank 50°: opposite aileron, clamped to ±30
        assert_eq!(aileron, -30.0);
    }

    #[test]
    fn test_bank_danger_nudges_bug_halfway() {
        let snap = TelemetrySnapshot {
            bank: 38.0,
            heading: 120.0,
            altitude_agl: 3000.0,
            altitude_msl: 4000.0,
            airspeed: 100.0,
            ..Default::default()
        };

        let mut ap = ap_on();
        ap.selected_heading_deg = 160.0;
        let (alert, out) = run(&snap, &ap, FlightPhase::Cruise);
        assert_eq!(alert, EnvelopeAlert::BankDanger);
        // Halfway from 160 back toward 120
        assert_eq!(find_value(&out, CommandKind::HeadingBugSet), Some(140.0));
    }

    #[test]
    fn test_bank_thresholds_tighten_low_without_ap() {
        let snap = TelemetrySnapshot {
            bank: 32.0,
            heading: 90.0,
            altitude_agl: 600.0,
            altitude_msl: 700.0,
            airspeed: 90.0,
            ..Default::default()
        };

        // AP off and low: 32° is past the tightened 30° critical limit
        let (alert, _out) = run(&snap, &ApState::default(), FlightPhase::Approach);
        assert_eq!(alert, EnvelopeAlert::Bank);

        // Same bank with the AP flying the heading: not even danger
        let (alert, _out) = run(&snap, &ap_on(), FlightPhase::Approach);
        assert_eq!(alert, EnvelopeAlert::None);
    }

    #[test]
    fn test_stall_protect_commands() {
        // 52 kt against a 53 kt Vs1, clean wing, shallow bank
        let snap = TelemetrySnapshot {
            airspeed: 52.0,
            bank: 10.0,
            heading: 270.0,
            altitude_agl: 2500.0,
            altitude_msl: 3000.0,
            ..Default::default()
        };

        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Climb);
        assert_eq!(alert, EnvelopeAlert::Stall);

        assert_eq!(find_value(&out, CommandKind::ThrottleSet), Some(100.0));
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-500.0));
        assert!(out
            .iter()
            .any(|c| c.kind == CommandKind::ApVsHold && c.value == CommandValue::Bool(true)));
        // Bank only 10°: no wings-level heading capture
        assert!(find_value(&out, CommandKind::HeadingBugSet).is_none());
    }

    #[test]
    fn test_stall_protect_gentler_above_stall_speed() {
        let snap = TelemetrySnapshot {
            airspeed: 55.0,
            bank: 0.0,
            altitude_agl: 2500.0,
            altitude_msl: 3000.0,
            ..Default::default()
        };

        // 55 kt: above the dynamic stall speed but inside the +5 margin
        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Climb);
        assert_eq!(alert, EnvelopeAlert::Stall);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-200.0));
    }

    #[test]
    fn test_stall_protect_levels_steep_bank() {
        let snap = TelemetrySnapshot {
            airspeed: 50.0,
            bank: 28.0,
            heading: 45.0,
            altitude_agl: 2500.0,
            altitude_msl: 3000.0,
            ..Default::default()
        };

        let (_, out) = run(&snap, &ap_on(), FlightPhase::Climb);
        assert_eq!(find_value(&out, CommandKind::HeadingBugSet), Some(45.0));
    }

    #[test]
    fn test_stall_warning_reduces_descent() {
        let snap = TelemetrySnapshot {
            airspeed: 60.0,
            bank: 5.0,
            vertical_speed: -600.0,
            altitude_agl: 2500.0,
            altitude_msl: 3000.0,
            ..Default::default()
        };

        // 60 kt: outside +5, inside +10 of the dynamic stall speed
        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Approach);
        assert_eq!(alert, EnvelopeAlert::StallWarn);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-200.0));
    }

    #[test]
    fn test_overspeed_protection() {
        let snap = TelemetrySnapshot {
            airspeed: 160.0,
            vertical_speed: -800.0,
            altitude_agl: 4000.0,
            altitude_msl: 5000.0,
            throttle_pct: 90.0,
            ..Default::default()
        };

        // Vne 163, margin 3 < 5
        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Descent);
        assert_eq!(alert, EnvelopeAlert::Overspeed);
        assert_eq!(find_value(&out, CommandKind::ThrottleSet), Some(50.0));
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-200.0));
    }

    #[test]
    fn test_over_vno_proportional_reduction_outside_descent() {
        let snap = TelemetrySnapshot {
            airspeed: 135.0,
            altitude_agl: 4000.0,
            altitude_msl: 5000.0,
            throttle_pct: 90.0,
            ..Default::default()
        };

        // Above Vno 129 in cruise: proportional throttle cut
        let (_, out) = run(&snap, &ap_on(), FlightPhase::Cruise);
        assert_eq!(find_value(&out, CommandKind::ThrottleSet), Some(78.0));

        // The same speed in a planned descent is acceptable
        let (_, out) = run(&snap, &ap_on(), FlightPhase::Descent);
        assert!(find_value(&out, CommandKind::ThrottleSet).is_none());
    }

    #[test]
    fn test_pitch_limits() {
        let mut snap = TelemetrySnapshot {
            pitch: 18.0,
            airspeed: 90.0,
            altitude_agl: 3000.0,
            altitude_msl: 4000.0,
            ..Default::default()
        };

        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Climb);
        assert_eq!(alert, EnvelopeAlert::Pitch);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(300.0));

        snap.pitch = -14.0;
        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Descent);
        assert_eq!(alert, EnvelopeAlert::Pitch);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-300.0));
    }

    #[test]
    fn test_vs_runaway_clamped() {
        let snap = TelemetrySnapshot {
            vertical_speed: -2100.0,
            airspeed: 120.0,
            altitude_agl: 4000.0,
            altitude_msl: 5000.0,
            ..Default::default()
        };

        // Below min_vs (-1500) - 200 grace
        let (_, out) = run(&snap, &ap_on(), FlightPhase::Descent);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-1500.0));
    }

    #[test]
    fn test_cruise_altitude_deviation_correction() {
        let mut snap = TelemetrySnapshot {
            altitude_msl: 5900.0,
            altitude_agl: 5300.0,
            airspeed: 110.0,
            ..Default::default()
        };

        // 400 ft high: descend 300 fpm
        let (_, out) = run(&snap, &ap_on(), FlightPhase::Cruise);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(-300.0));

        // 400 ft low: climb 300 fpm
        snap.altitude_msl = 5100.0;
        let (_, out) = run(&snap, &ap_on(), FlightPhase::Cruise);
        assert_eq!(find_value(&out, CommandKind::ApVsVarSet), Some(300.0));

        // Inside the band: no correction
        snap.altitude_msl = 5600.0;
        let (_, out) = run(&snap, &ap_on(), FlightPhase::Cruise);
        assert!(find_value(&out, CommandKind::ApVsVarSet).is_none());
    }

    #[test]
    fn test_clean_envelope_no_commands() {
        let snap = TelemetrySnapshot {
            airspeed: 110.0,
            bank: 5.0,
            pitch: 2.0,
            vertical_speed: 0.0,
            altitude_msl: 5500.0,
            altitude_agl: 4900.0,
            ..Default::default()
        };

        let (alert, out) = run(&snap, &ap_on(), FlightPhase::Cruise);
        assert_eq!(alert, EnvelopeAlert::None);
        assert!(out.is_empty(), "unexpected commands: {:?}", out);
    }
}
