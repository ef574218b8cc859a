//! Taxi route planner client.
//!
//! The planner is an external HTTP service that runs A* over the airport
//! taxiway graph. The trait keeps the ground controller testable with a
//! stub; the HTTP implementation is the production path.
//!
//! Requests are owned by the caller and cancel-on-new-request: the
//! supervisor aborts any in-flight plan before issuing another.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::route::{RouteWaypoint, TaxiRoute};

/// Default planner request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the taxi planner.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Transport-level failure.
    #[error("planner request failed: {0}")]
    Request(String),

    /// The planner answered but could not produce a route.
    #[error("planner found no route: {0}")]
    NoRoute(String),
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Route planning interface.
pub trait TaxiPlanner: Send + Sync {
    /// Plan a taxi route from the given position to the runway.
    fn plan<'a>(
        &'a self,
        icao: &'a str,
        from_lat: f64,
        from_lon: f64,
        to_runway: &'a str,
    ) -> BoxFuture<'a, Result<TaxiRoute, PlannerError>>;
}

/// Wire response from the planner service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    taxiways: Vec<String>,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    waypoints: Vec<RouteWaypoint>,
    #[serde(default, rename = "distance_ft")]
    distance_ft: f64,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the planner service.
pub struct HttpTaxiPlanner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaxiPlanner {
    /// Create a client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl TaxiPlanner for HttpTaxiPlanner {
    fn plan<'a>(
        &'a self,
        icao: &'a str,
        from_lat: f64,
        from_lon: f64,
        to_runway: &'a str,
    ) -> BoxFuture<'a, Result<TaxiRoute, PlannerError>> {
        Box::pin(async move {
            let url = format!("{}/atc/route", self.base_url.trim_end_matches('/'));
            debug!(icao, to_runway, "Requesting taxi route");

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("icao", icao.to_string()),
                    ("fromLat", from_lat.to_string()),
                    ("fromLon", from_lon.to_string()),
                    ("toRunway", to_runway.to_string()),
                ])
                .send()
                .await
                .map_err(|e| PlannerError::Request(e.to_string()))?;

            let parsed: PlannerResponse = response
                .json()
                .await
                .map_err(|e| PlannerError::Request(e.to_string()))?;

            if !parsed.success {
                return Err(PlannerError::NoRoute(
                    parsed.error.unwrap_or_else(|| "unspecified".to_string()),
                ));
            }

            Ok(TaxiRoute {
                waypoints: parsed.waypoints,
                taxiways: parsed.taxiways,
                instruction: parsed.instruction,
                distance_ft: parsed.distance_ft,
            })
        })
    }
}
