//! Ground ATC controller.
//!
//! A small tower simulation that gates takeoff: it requests taxi routes
//! from the external planner, tracks progress along the cleared route,
//! holds the aircraft short of the runway, and issues the takeoff
//! clearance. The flight-phase classifier consults it through the
//! [`TakeoffGate`] trait before allowing a takeoff roll.
//!
//! Timed transitions (hold-short report, clearance delay, airborne
//! cooldown) are driven by the position updates the supervisor feeds every
//! tick; the controller owns no timer of its own.

mod phraseology;
mod planner;
mod readback;
mod route;

pub use phraseology::{phonetic_digit, phonetic_letter, runway_phrase, spell_ident, taxiway_list};
pub use planner::{BoxFuture, HttpTaxiPlanner, PlannerError, TaxiPlanner};
pub use readback::{validate_readback, ReadbackResult};
pub use route::{RouteWaypoint, TaxiRoute, WaypointType};

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::{haversine_distance_ft, initial_bearing_deg};
use crate::phase::TakeoffGate;
use crate::telemetry::TelemetrySnapshot;

/// Capture radius around a route waypoint, feet.
const WAYPOINT_CAPTURE_FT: f64 = 100.0;

/// Distance from the current waypoint that counts as off-route, feet.
const OFF_ROUTE_FT: f64 = 500.0;

/// Ground speed above which off-route advisories fire, knots.
const OFF_ROUTE_MIN_GS_KT: f64 = 2.0;

/// Minimum interval between off-route advisories.
const OFF_ROUTE_ADVISORY_INTERVAL: Duration = Duration::from_secs(10);

/// Dwell at the hold-short line before auto-reporting ready.
const HOLD_SHORT_REPORT_DELAY: Duration = Duration::from_secs(5);

/// Delay between the ready report and the takeoff clearance.
const TAKEOFF_CLEARANCE_DELAY: Duration = Duration::from_secs(2);

/// AGL above which a cleared departure counts as airborne, feet.
const AIRBORNE_AGL_FT: f64 = 50.0;

/// Cooldown after liftoff before the controller deactivates.
const AIRBORNE_COOLDOWN: Duration = Duration::from_secs(5);

/// Ground controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtcPhase {
    /// Controller detached; no gating.
    #[default]
    Inactive,
    /// At the ramp, no clearance requested.
    Parked,
    /// Waiting on the route planner.
    TaxiClearancePending,
    /// Taxiing the cleared route.
    Taxiing,
    /// Holding short of the departure runway.
    HoldShort,
    /// Ready report made, waiting for the clearance.
    TakeoffClearancePending,
    /// Cleared for takeoff.
    ClearedTakeoff,
    /// Departed; cooling down to INACTIVE.
    Airborne,
}

impl std::fmt::Display for AtcPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AtcPhase::Inactive => "inactive",
            AtcPhase::Parked => "parked",
            AtcPhase::TaxiClearancePending => "taxi-clearance-pending",
            AtcPhase::Taxiing => "taxiing",
            AtcPhase::HoldShort => "hold-short",
            AtcPhase::TakeoffClearancePending => "takeoff-clearance-pending",
            AtcPhase::ClearedTakeoff => "cleared-takeoff",
            AtcPhase::Airborne => "airborne",
        };
        write!(f, "{}", name)
    }
}

/// Category of an emitted instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    /// A clearance the pilot must comply with.
    Clearance,
    /// Route progress ("turn onto taxiway Bravo").
    Progress,
    /// Advisory (off-route, degraded planner).
    Advisory,
    /// Failure report.
    Error,
}

/// Errors from controller requests.
#[derive(Debug, Error)]
pub enum AtcError {
    /// The runway ident failed validation; no state was changed.
    #[error("invalid runway ident: {0}")]
    InvalidRunway(String),

    /// The request is not valid in the current phase.
    #[error("request not valid while {0}")]
    WrongPhase(AtcPhase),
}

/// Callback for ATC voice/text output.
pub type InstructionCallback = Box<dyn FnMut(&str, InstructionKind) + Send>;

/// Ground ATC controller and taxi-route tracker.
pub struct GroundController {
    phase: AtcPhase,
    airport_icao: String,
    runway: String,
    route: Option<TaxiRoute>,
    route_index: usize,
    hold_short_since: Option<Instant>,
    report_made_at: Option<Instant>,
    airborne_since: Option<Instant>,
    last_off_route_advisory: Option<Instant>,
    on_instruction: Option<InstructionCallback>,
}

impl GroundController {
    /// Create a controller in INACTIVE.
    pub fn new() -> Self {
        Self {
            phase: AtcPhase::Inactive,
            airport_icao: String::new(),
            runway: String::new(),
            route: None,
            route_index: 0,
            hold_short_since: None,
            report_made_at: None,
            airborne_since: None,
            last_off_route_advisory: None,
            on_instruction: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> AtcPhase {
        self.phase
    }

    /// Whether the controller is attached and gating.
    pub fn is_active(&self) -> bool {
        self.phase != AtcPhase::Inactive
    }

    /// The cleared runway ident, if any.
    pub fn runway(&self) -> &str {
        &self.runway
    }

    /// The active taxi route, if any.
    pub fn route(&self) -> Option<&TaxiRoute> {
        self.route.as_ref()
    }

    /// Register the instruction callback.
    pub fn set_on_instruction(&mut self, callback: InstructionCallback) {
        self.on_instruction = Some(callback);
    }

    /// Attach the controller at the ramp.
    pub fn activate(&mut self) {
        if self.phase == AtcPhase::Inactive {
            self.transition(AtcPhase::Parked);
        }
    }

    /// Detach the controller and clear the route.
    pub fn deactivate(&mut self) {
        self.route = None;
        self.route_index = 0;
        self.runway.clear();
        self.airport_icao.clear();
        self.hold_short_since = None;
        self.report_made_at = None;
        self.airborne_since = None;
        self.transition(AtcPhase::Inactive);
    }

    /// Request taxi clearance to a departure runway.
    ///
    /// Validates the runway ident before any state change, then moves to
    /// TAXI_CLEARANCE_PENDING. The caller drives the planner and reports
    /// back via [`Self::route_received`] or [`Self::route_failed`].
    pub fn request_taxi_clearance(&mut self, icao: &str, runway: &str) -> Result<(), AtcError> {
        if !is_valid_runway_ident(runway) {
            return Err(AtcError::InvalidRunway(runway.to_string()));
        }
        if self.phase != AtcPhase::Parked {
            return Err(AtcError::WrongPhase(self.phase));
        }

        self.airport_icao = icao.to_ascii_uppercase();
        self.runway = runway.to_ascii_uppercase();
        self.transition(AtcPhase::TaxiClearancePending);
        Ok(())
    }

    /// Deliver a planner route for the pending clearance.
    pub fn route_received(&mut self, route: TaxiRoute) {
        if self.phase != AtcPhase::TaxiClearancePending {
            debug!(phase = %self.phase, "Discarding route outside clearance request");
            return;
        }
        if route.is_empty() {
            self.route_failed("planner returned an empty route");
            return;
        }

        let text = if route.instruction.is_empty() {
            format!(
                "{} ground, runway {}, taxi via {}",
                self.airport_icao,
                runway_phrase(&self.runway),
                taxiway_list(&route.taxiways)
            )
        } else {
            route.instruction.clone()
        };

        self.route = Some(route);
        self.route_index = 0;
        self.transition(AtcPhase::Taxiing);
        self.emit(&text, InstructionKind::Clearance);
    }

    /// Report a planner failure; degrades back to PARKED.
    pub fn route_failed(&mut self, reason: &str) {
        warn!(reason, "Taxi route planning failed");
        if self.phase == AtcPhase::TaxiClearancePending {
            self.transition(AtcPhase::Parked);
        }
        self.emit(
            &format!("Unable to issue taxi clearance: {}", reason),
            InstructionKind::Error,
        );
    }

    /// Validate a pilot readback against the current clearance.
    pub fn check_readback(&self, text: &str) -> ReadbackResult {
        let taxiways = self
            .route
            .as_ref()
            .map(|r| r.taxiways.clone())
            .unwrap_or_default();
        validate_readback(text, &self.runway, &taxiways)
    }

    /// Bearing from the given position to the current route waypoint.
    pub fn next_waypoint_bearing(&self, lat: f64, lon: f64) -> Option<f64> {
        let wp = self.current_waypoint()?;
        Some(initial_bearing_deg(lat, lon, wp.lat, wp.lon))
    }

    /// The waypoint currently being tracked.
    pub fn current_waypoint(&self) -> Option<&RouteWaypoint> {
        self.route.as_ref()?.waypoints.get(self.route_index)
    }

    /// Whether the controller is holding the aircraft short of the runway.
    pub fn is_holding_short(&self) -> bool {
        matches!(
            self.phase,
            AtcPhase::HoldShort | AtcPhase::TakeoffClearancePending
        )
    }

    /// Feed a position update. Returns true when the phase changed.
    pub fn update_position(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        self.update_position_at(snapshot, Instant::now())
    }

    /// Feed a position update with an explicit timestamp.
    pub fn update_position_at(&mut self, snapshot: &TelemetrySnapshot, now: Instant) -> bool {
        let before = self.phase;

        match self.phase {
            AtcPhase::Taxiing => self.update_taxi_progress(snapshot, now),
            AtcPhase::HoldShort => {
                if let Some(since) = self.hold_short_since {
                    if now.duration_since(since) >= HOLD_SHORT_REPORT_DELAY {
                        self.report_made_at = Some(now);
                        self.transition(AtcPhase::TakeoffClearancePending);
                        self.emit(
                            &format!(
                                "Holding short runway {}, ready for departure",
                                runway_phrase(&self.runway)
                            ),
                            InstructionKind::Progress,
                        );
                    }
                }
            }
            AtcPhase::TakeoffClearancePending => {
                if let Some(reported) = self.report_made_at {
                    if now.duration_since(reported) >= TAKEOFF_CLEARANCE_DELAY {
                        self.transition(AtcPhase::ClearedTakeoff);
                        self.emit(
                            &format!(
                                "Runway {}, cleared for takeoff",
                                runway_phrase(&self.runway)
                            ),
                            InstructionKind::Clearance,
                        );
                    }
                }
            }
            AtcPhase::ClearedTakeoff => {
                if snapshot.altitude_agl > AIRBORNE_AGL_FT {
                    self.airborne_since = Some(now);
                    self.transition(AtcPhase::Airborne);
                }
            }
            AtcPhase::Airborne => {
                if let Some(since) = self.airborne_since {
                    if now.duration_since(since) >= AIRBORNE_COOLDOWN {
                        self.deactivate();
                    }
                }
            }
            AtcPhase::Inactive | AtcPhase::Parked | AtcPhase::TaxiClearancePending => {}
        }

        self.phase != before
    }

    fn update_taxi_progress(&mut self, snapshot: &TelemetrySnapshot, now: Instant) {
        let Some(wp) = self.current_waypoint().cloned() else {
            self.enter_hold_short(now);
            return;
        };

        let distance_ft =
            haversine_distance_ft(snapshot.latitude, snapshot.longitude, wp.lat, wp.lon);

        if distance_ft < WAYPOINT_CAPTURE_FT {
            if wp.waypoint_type == WaypointType::RunwayHold {
                self.enter_hold_short(now);
                return;
            }

            self.route_index += 1;
            match self.current_waypoint() {
                Some(next) => {
                    let text = match next.waypoint_type {
                        WaypointType::RunwayHold => {
                            format!("Continue to hold short, runway {}", runway_phrase(&self.runway))
                        }
                        _ => format!("Turn onto taxiway {}", spell_ident(&next.name)),
                    };
                    self.emit(&text, InstructionKind::Progress);
                }
                None => self.enter_hold_short(now),
            }
            return;
        }

        // Off-route advisory, rate limited
        if distance_ft > OFF_ROUTE_FT && snapshot.ground_speed > OFF_ROUTE_MIN_GS_KT {
            let due = match self.last_off_route_advisory {
                Some(last) => now.duration_since(last) >= OFF_ROUTE_ADVISORY_INTERVAL,
                None => true,
            };
            if due {
                self.last_off_route_advisory = Some(now);
                self.emit(
                    &format!("Off the cleared route, proceed to taxiway {}", spell_ident(&wp.name)),
                    InstructionKind::Advisory,
                );
            }
        }
    }

    fn enter_hold_short(&mut self, now: Instant) {
        self.hold_short_since = Some(now);
        self.transition(AtcPhase::HoldShort);
        self.emit(
            &format!("Hold short runway {}", runway_phrase(&self.runway)),
            InstructionKind::Clearance,
        );
    }

    fn transition(&mut self, next: AtcPhase) {
        if next != self.phase {
            info!(from = %self.phase, to = %next, "ATC phase transition");
            self.phase = next;
        }
    }

    fn emit(&mut self, text: &str, kind: InstructionKind) {
        debug!(?kind, "ATC: {}", text);
        if let Some(callback) = self.on_instruction.as_mut() {
            callback(text, kind);
        }
    }
}

impl Default for GroundController {
    fn default() -> Self {
        Self::new()
    }
}

impl TakeoffGate for GroundController {
    fn takeoff_permitted(&self) -> bool {
        matches!(self.phase, AtcPhase::Inactive | AtcPhase::ClearedTakeoff)
    }
}

impl crate::engine::GroundGuidance for GroundController {
    fn holding_short(&self) -> bool {
        self.is_holding_short()
    }

    fn steering_bearing(&self, lat: f64, lon: f64) -> Option<f64> {
        self.next_waypoint_bearing(lat, lon)
    }
}

impl std::fmt::Debug for GroundController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroundController")
            .field("phase", &self.phase)
            .field("runway", &self.runway)
            .field("route_index", &self.route_index)
            .finish()
    }
}

/// Runway idents are 1-2 digits in 01-36 with an optional L/R/C suffix.
fn is_valid_runway_ident(runway: &str) -> bool {
    let runway = runway.trim().to_ascii_uppercase();
    if runway.is_empty() || runway.len() > 3 {
        return false;
    }

    let (digits, suffix) = match runway.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => runway.split_at(pos),
        None => (runway.as_str(), ""),
    };

    if !matches!(suffix, "" | "L" | "R" | "C") {
        return false;
    }

    matches!(digits.parse::<u32>(), Ok(n) if (1..=36).contains(&n))
}
