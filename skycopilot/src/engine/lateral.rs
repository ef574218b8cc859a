//! Lateral navigation.
//!
//! Decides what steers the aircraft left-right when the autopilot is not
//! already coupled to an approach: hand the receiver the job (NAV hold)
//! when the CDI is trustworthy, otherwise derive a heading-bug value from,
//! in priority order, the local flight plan, a manual CDI intercept, or the
//! receiver's active waypoint bearing.

use crate::geo::{haversine_distance_nm, initial_bearing_deg, normalize_heading};
use crate::telemetry::{TelemetrySnapshot, ToFrom};
use crate::wind::wind_corrected_heading;

/// Cross-track error below which no intercept is needed, nm.
const XTRK_DEADBAND_NM: f64 = 0.1;

/// Cross-track error up to which a shallow 10° intercept applies, nm.
const XTRK_SHALLOW_NM: f64 = 0.3;

/// Cross-track error at which the intercept saturates, nm.
const XTRK_SATURATION_NM: f64 = 1.0;

/// Intercept angle for the shallow band, degrees.
const INTERCEPT_SHALLOW_DEG: f64 = 10.0;

/// Saturation intercept angle, degrees.
const INTERCEPT_MAX_DEG: f64 = 30.0;

/// Cross-track error beyond which NAV hold will not couple, nm.
const NAV_ENGAGE_MAX_XTRK_NM: f64 = 2.0;

/// Waypoint capture radius for flight-plan sequencing, nm.
const PLAN_SEQUENCE_NM: f64 = 0.5;

/// TAS above which wind correction is applied, knots.
const WIND_CORRECTION_MIN_TAS_KT: f64 = 50.0;

/// Wind speed above which wind correction is applied, knots.
const WIND_CORRECTION_MIN_WIND_KT: f64 = 1.0;

/// A waypoint of the locally managed flight plan.
#[derive(Debug, Clone)]
pub struct PlanWaypoint {
    /// Waypoint identifier.
    pub ident: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Locally managed flight plan with great-circle sequencing.
#[derive(Debug, Clone, Default)]
pub struct FlightPlan {
    waypoints: Vec<PlanWaypoint>,
    active_index: usize,
}

impl FlightPlan {
    /// Create a plan over the given waypoints.
    pub fn new(waypoints: Vec<PlanWaypoint>) -> Self {
        Self {
            waypoints,
            active_index: 0,
        }
    }

    /// The active waypoint, if the plan is not exhausted.
    pub fn active(&self) -> Option<&PlanWaypoint> {
        self.waypoints.get(self.active_index)
    }

    /// Whether every waypoint has been sequenced.
    pub fn is_complete(&self) -> bool {
        self.active_index >= self.waypoints.len()
    }

    /// Sequence past the active waypoint when within the capture radius.
    ///
    /// Returns the ident of any waypoint passed.
    pub fn sequence(&mut self, lat: f64, lon: f64) -> Option<String> {
        let wp = self.active()?;
        if haversine_distance_nm(lat, lon, wp.lat, wp.lon) < PLAN_SEQUENCE_NM {
            let ident = wp.ident.clone();
            self.active_index += 1;
            tracing::info!(waypoint = %ident, "Flight plan waypoint sequenced");
            return Some(ident);
        }
        None
    }

    /// Bearing and distance to the active waypoint.
    pub fn active_bearing_dist(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        let wp = self.active()?;
        Some((
            initial_bearing_deg(lat, lon, wp.lat, wp.lon),
            haversine_distance_nm(lat, lon, wp.lat, wp.lon),
        ))
    }
}

/// Heading to fly to rejoin a desired track.
///
/// The intercept angle scales with cross-track error (0° inside the
/// deadband, 10° shallow, linear to 30° at 1 nm, 30° beyond) and opposes
/// the error: right of course intercepts leftward.
pub fn compute_intercept_heading(dtk_deg: f64, xtrk_nm: f64, _to_from: ToFrom) -> f64 {
    let magnitude = xtrk_nm.abs();

    let correction = if magnitude < XTRK_DEADBAND_NM {
        0.0
    } else if magnitude < XTRK_SHALLOW_NM {
        INTERCEPT_SHALLOW_DEG
    } else if magnitude < XTRK_SATURATION_NM {
        INTERCEPT_SHALLOW_DEG
            + (magnitude - XTRK_SHALLOW_NM) / (XTRK_SATURATION_NM - XTRK_SHALLOW_NM)
                * (INTERCEPT_MAX_DEG - INTERCEPT_SHALLOW_DEG)
    } else {
        INTERCEPT_MAX_DEG
    };

    let signed = if xtrk_nm > 0.0 { -correction } else { correction };
    normalize_heading(dtk_deg + signed)
}

/// Outcome of the lateral decision.
#[derive(Debug, Clone, PartialEq)]
pub enum LateralDecision {
    /// Couple the receiver: engage NAV hold.
    EngageNav,
    /// Fly a heading: set the bug and engage HDG hold.
    HeadingBug {
        /// Heading to set, degrees.
        heading: f64,
        /// What produced it, for the command description.
        source: &'static str,
    },
    /// Nothing to steer by.
    None,
}

/// Decide the lateral guidance for this tick.
pub fn decide_lateral(
    snapshot: &TelemetrySnapshot,
    flight_plan: Option<&mut FlightPlan>,
) -> LateralDecision {
    let cdi = &snapshot.nav.cdi;

    // A trustworthy CDI flies itself
    if cdi.has_source() && cdi.to_from == ToFrom::To && cdi.xtrk.abs() < NAV_ENGAGE_MAX_XTRK_NM {
        return LateralDecision::EngageNav;
    }

    // Local flight plan
    if let Some(plan) = flight_plan {
        plan.sequence(snapshot.latitude, snapshot.longitude);
        if let Some((bearing, _dist)) = plan.active_bearing_dist(snapshot.latitude, snapshot.longitude)
        {
            return LateralDecision::HeadingBug {
                heading: apply_wind_correction(bearing, snapshot),
                source: "flight plan",
            };
        }
    }

    // Manual CDI intercept
    if cdi.has_source() {
        return LateralDecision::HeadingBug {
            heading: apply_wind_correction(
                compute_intercept_heading(cdi.dtk, cdi.xtrk, cdi.to_from),
                snapshot,
            ),
            source: "course intercept",
        };
    }

    // Direct-to the receiver's active waypoint
    if snapshot.nav.active_waypoint.is_valid() {
        return LateralDecision::HeadingBug {
            heading: apply_wind_correction(snapshot.nav.active_waypoint.bearing, snapshot),
            source: "direct to waypoint",
        };
    }

    LateralDecision::None
}

/// Wind-triangle correction, applied only when it is meaningful.
fn apply_wind_correction(track_deg: f64, snapshot: &TelemetrySnapshot) -> f64 {
    let tas = snapshot.true_airspeed();
    if tas > WIND_CORRECTION_MIN_TAS_KT && snapshot.wind_speed > WIND_CORRECTION_MIN_WIND_KT {
        wind_corrected_heading(track_deg, tas, snapshot.wind_direction, snapshot.wind_speed)
    } else {
        normalize_heading(track_deg)
    }
}
