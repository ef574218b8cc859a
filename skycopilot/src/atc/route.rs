//! Taxi route types returned by the route planner.

use serde::{Deserialize, Serialize};

/// Kind of node along a taxi route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaypointType {
    /// Intermediate taxiway node.
    Taxiway,
    /// Hold-short line ahead of the departure runway.
    RunwayHold,
    /// Runway threshold.
    RunwayThreshold,
    /// Parking / ramp position.
    Parking,
}

/// One node of a planned taxi route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteWaypoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Node name (taxiway letter, runway ident, gate name).
    pub name: String,
    /// Node kind.
    #[serde(rename = "type")]
    pub waypoint_type: WaypointType,
}

/// A planned taxi route from the ramp to the departure runway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaxiRoute {
    /// Ordered route nodes.
    #[serde(default)]
    pub waypoints: Vec<RouteWaypoint>,
    /// Taxiway names in clearance order.
    #[serde(default)]
    pub taxiways: Vec<String>,
    /// Planner-formatted instruction text.
    #[serde(default)]
    pub instruction: String,
    /// Total route length in feet.
    #[serde(default)]
    pub distance_ft: f64,
}

impl TaxiRoute {
    /// Whether the route has any nodes.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}
