//! Flight telemetry snapshot types.
//!
//! A [`TelemetrySnapshot`] is the per-tick input to the whole control
//! pipeline: classifier, ATC controller, and rule engine all read the same
//! copied snapshot, never live simulator state.
//!
//! # Robustness
//!
//! Simulator feeds are lossy. Every field carries a serde default so a
//! partial packet deserializes with missing numerics as 0 and missing
//! booleans as false rather than failing the tick.

use serde::{Deserialize, Deserializer, Serialize};

/// AGL below which the simulator's raw on-ground flag is trusted (feet).
const GROUND_TRUST_AGL_FT: f64 = 50.0;

/// AGL below which near-zero vertical speed alone implies ground (feet).
const GROUND_IMPLIED_AGL_FT: f64 = 15.0;

/// Vertical speed magnitude treated as "not flying" (feet per minute).
const GROUND_IMPLIED_VS_FPM: f64 = 200.0;

/// Engine RPM at or above which the engine counts as running.
const ENGINE_RUNNING_RPM: f64 = 500.0;

/// TO/FROM flag from a CDI source.
///
/// Simulators deliver this either as a string (`"TO"`/`"FROM"`) or as the
/// numeric convention 1 = TO, 2 = FROM; both forms deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum ToFrom {
    /// Station is ahead on the desired track.
    To,
    /// Station has been passed.
    From,
    /// No valid flag.
    #[default]
    Off,
}

impl<'de> Deserialize<'de> for ToFrom {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TO" => ToFrom::To,
                "FROM" => ToFrom::From,
                _ => ToFrom::Off,
            },
            Raw::Number(1) => ToFrom::To,
            Raw::Number(2) => ToFrom::From,
            Raw::Number(_) => ToFrom::Off,
        })
    }
}

/// Terrain awareness alert level from an external TAWS unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TawsLevel {
    /// No terrain alert.
    #[default]
    None,
    /// Terrain within caution margins.
    Caution,
    /// Terrain conflict, climb required.
    Warning,
}

/// Course deviation indicator state from the active nav source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CdiState {
    /// Nav source identifier (e.g. "GPS", "NAV1"). Empty when no source.
    pub source: String,
    /// Desired track in degrees.
    pub dtk: f64,
    /// Cross-track error in nautical miles; positive = right of course.
    pub xtrk: f64,
    /// TO/FROM flag.
    pub to_from: ToFrom,
    /// Whether glideslope guidance is valid.
    pub gs_valid: bool,
}

impl CdiState {
    /// Whether a nav source is present.
    pub fn has_source(&self) -> bool {
        !self.source.is_empty()
    }
}

/// Active flight-plan waypoint from the nav receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveWaypoint {
    /// Waypoint identifier.
    pub ident: String,
    /// Bearing to the waypoint in degrees.
    pub bearing: f64,
    /// Distance to the waypoint in nautical miles.
    pub dist_nm: f64,
}

impl ActiveWaypoint {
    /// Whether the receiver reports an active waypoint.
    pub fn is_valid(&self) -> bool {
        !self.ident.is_empty()
    }
}

/// Approach guidance state from the nav receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApproachState {
    /// Approach mode label (e.g. "ILS", "RNAV"). Empty when none armed.
    pub mode: String,
    /// Whether the approach provides a glideslope.
    pub has_glideslope: bool,
}

/// Navigation snapshot merged into each telemetry tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavSnapshot {
    /// Course deviation state.
    pub cdi: CdiState,
    /// Active waypoint, if any.
    pub active_waypoint: ActiveWaypoint,
    /// Approach guidance state.
    pub approach: ApproachState,
    /// Distance to destination in nautical miles (0 when unknown).
    pub dest_dist_nm: f64,
}

/// A single telemetry snapshot from the simulator bridge.
///
/// Copied once per tick; all subsystems read the copy. Angles are degrees,
/// speeds are knots, vertical speed is feet per minute, altitudes are feet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySnapshot {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in feet.
    pub altitude_msl: f64,
    /// Altitude above ground level in feet.
    pub altitude_agl: f64,

    /// Pitch in degrees, positive = nose up.
    pub pitch: f64,
    /// Bank in degrees, positive = right wing down.
    pub bank: f64,
    /// Magnetic heading in degrees.
    pub heading: f64,

    /// Indicated airspeed in knots.
    pub airspeed: f64,
    /// Ground speed in knots.
    pub ground_speed: f64,
    /// Vertical speed in feet per minute.
    pub vertical_speed: f64,

    /// Wind vector heading in degrees (direction the air mass moves toward).
    pub wind_direction: f64,
    /// Wind speed in knots.
    pub wind_speed: f64,
    /// Outside air temperature in Celsius.
    pub outside_air_temp_c: f64,

    /// Flap detent index (0 = retracted).
    pub flaps_index: u8,
    /// Landing gear down and locked.
    pub gear_down: bool,
    /// Parking brake set.
    pub parking_brake: bool,
    /// Throttle lever position, percent.
    pub throttle_pct: f64,

    /// Engine RPM.
    pub engine_rpm: f64,
    /// Raw engine-running flag from the simulator.
    pub engine_running: bool,

    /// Raw on-ground flag from the simulator. Untrustworthy on its own;
    /// use [`TelemetrySnapshot::on_ground`].
    pub raw_on_ground: bool,

    /// Navigation snapshot.
    pub nav: NavSnapshot,

    /// External TAWS alert level.
    pub taws_level: TawsLevel,
}

impl TelemetrySnapshot {
    /// Grounding heuristic.
    ///
    /// The raw simulator flag false-positives at altitude and false-negatives
    /// on bumpy runways, so it is only trusted below 50 ft AGL, and a
    /// near-zero vertical speed below 15 ft AGL implies ground regardless.
    pub fn on_ground(&self) -> bool {
        (self.raw_on_ground && self.altitude_agl < GROUND_TRUST_AGL_FT)
            || (self.altitude_agl < GROUND_IMPLIED_AGL_FT
                && self.vertical_speed.abs() < GROUND_IMPLIED_VS_FPM)
    }

    /// Engine-running heuristic: the raw flag, with RPM as tiebreaker.
    pub fn engine_is_running(&self) -> bool {
        self.engine_running || self.engine_rpm >= ENGINE_RUNNING_RPM
    }

    /// True airspeed estimate in knots (2% per 1000 ft rule of thumb).
    pub fn true_airspeed(&self) -> f64 {
        self.airspeed * (1.0 + 0.02 * (self.altitude_msl.max(0.0) / 1000.0))
    }
}
