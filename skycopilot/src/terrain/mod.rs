//! Terrain look-ahead guard.
//!
//! Projects the aircraft's current track 2, 5, and 10 nm ahead, predicts the
//! altitude at each point from the current vertical speed and ground speed,
//! and compares against terrain elevation from an injected database. External
//! TAWS alerts merge in by maximum severity.
//!
//! The check runs at most every 2 seconds; between checks the last
//! assessment is returned unchanged.

use std::time::{Duration, Instant};

use crate::geo::project_point;
use crate::telemetry::{TawsLevel, TelemetrySnapshot};

/// Interval between terrain sweeps.
const CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Look-ahead distances in nautical miles.
const LOOKAHEAD_NM: [f64; 3] = [2.0, 5.0, 10.0];

/// Clearance below which a WARNING is raised (feet).
const WARNING_CLEARANCE_FT: f64 = 500.0;

/// Clearance below which a CAUTION is raised (feet).
const CAUTION_CLEARANCE_FT: f64 = 1500.0;

/// Margin added above the worst terrain for the commanded escape altitude.
const ESCAPE_MARGIN_FT: f64 = 1500.0;

/// Ground speed below which look-ahead is meaningless (knots).
const MIN_LOOKAHEAD_GS_KT: f64 = 10.0;

/// Source of terrain elevation data.
///
/// Injected so tests can stub a synthetic grid; the production
/// implementation wraps the simulator's elevation service.
pub trait TerrainDatabase: Send {
    /// Terrain elevation in feet MSL at the given point, or `None` where
    /// the database has no coverage.
    fn elevation_ft(&self, lat: f64, lon: f64) -> Option<f64>;
}

/// Flat database with no coverage; the guard degrades to TAWS pass-through.
#[derive(Debug, Default)]
pub struct NoTerrainData;

impl TerrainDatabase for NoTerrainData {
    fn elevation_ft(&self, _lat: f64, _lon: f64) -> Option<f64> {
        None
    }
}

/// Result of a terrain sweep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TerrainAssessment {
    /// Alert severity after merging external TAWS.
    pub level: TawsLevel,
    /// Worst predicted clearance over the look-ahead points, feet.
    pub worst_clearance_ft: Option<f64>,
    /// Terrain elevation at the worst point, feet MSL.
    pub worst_terrain_ft: Option<f64>,
    /// Escape altitude to command on WARNING, feet MSL.
    pub escape_altitude_ft: Option<f64>,
}

/// Look-ahead terrain guard.
pub struct TerrainGuard {
    database: Box<dyn TerrainDatabase>,
    last_check: Option<Instant>,
    last_assessment: TerrainAssessment,
}

impl TerrainGuard {
    /// Create a guard over the given terrain database.
    pub fn new(database: Box<dyn TerrainDatabase>) -> Self {
        Self {
            database,
            last_check: None,
            last_assessment: TerrainAssessment::default(),
        }
    }

    /// Evaluate terrain for this tick.
    pub fn check(&mut self, snapshot: &TelemetrySnapshot) -> TerrainAssessment {
        self.check_at(snapshot, Instant::now())
    }

    /// Evaluate with an explicit timestamp.
    ///
    /// Recomputes at most every 2 s; always merges the snapshot's external
    /// TAWS level so a fresh external alert is never sat on.
    pub fn check_at(&mut self, snapshot: &TelemetrySnapshot, now: Instant) -> TerrainAssessment {
        let due = match self.last_check {
            Some(last) => now.duration_since(last) >= CHECK_INTERVAL,
            None => true,
        };

        if due {
            self.last_check = Some(now);
            self.last_assessment = self.sweep(snapshot);
        }

        let mut merged = self.last_assessment;
        merged.level = merged.level.max(snapshot.taws_level);
        merged
    }

    fn sweep(&self, snapshot: &TelemetrySnapshot) -> TerrainAssessment {
        if snapshot.ground_speed < MIN_LOOKAHEAD_GS_KT {
            return TerrainAssessment::default();
        }

        let mut worst_clearance: Option<f64> = None;
        let mut worst_terrain: Option<f64> = None;

        for dist_nm in LOOKAHEAD_NM {
            let (lat, lon) = project_point(
                snapshot.latitude,
                snapshot.longitude,
                snapshot.heading,
                dist_nm,
            );

            let Some(terrain_ft) = self.database.elevation_ft(lat, lon) else {
                continue;
            };

            // Minutes to reach the point at current ground speed
            let minutes = dist_nm / snapshot.ground_speed * 60.0;
            let predicted_alt = snapshot.altitude_msl + snapshot.vertical_speed * minutes;
            let clearance = predicted_alt - terrain_ft;

            if worst_clearance.is_none_or(|wc| clearance < wc) {
                worst_clearance = Some(clearance);
                worst_terrain = Some(terrain_ft);
            }
        }

        let level = match worst_clearance {
            Some(c) if c < WARNING_CLEARANCE_FT => TawsLevel::Warning,
            Some(c) if c < CAUTION_CLEARANCE_FT => TawsLevel::Caution,
            _ => TawsLevel::None,
        };

        if level == TawsLevel::Warning {
            tracing::warn!(
                clearance_ft = worst_clearance.unwrap_or(0.0),
                terrain_ft = worst_terrain.unwrap_or(0.0),
                "Terrain warning ahead"
            );
        }

        TerrainAssessment {
            level,
            worst_clearance_ft: worst_clearance,
            worst_terrain_ft: worst_terrain,
            escape_altitude_ft: match level {
                TawsLevel::Warning => worst_terrain.map(|t| t + ESCAPE_MARGIN_FT),
                _ => None,
            },
        }
    }
}

impl std::fmt::Debug for TerrainGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainGuard")
            .field("last_check", &self.last_check)
            .field("last_assessment", &self.last_assessment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Database returning one elevation everywhere.
    struct FlatTerrain(f64);

    impl TerrainDatabase for FlatTerrain {
        fn elevation_ft(&self, _lat: f64, _lon: f64) -> Option<f64> {
            Some(self.0)
        }
    }

    fn cruising(alt_msl: f64, vs: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            latitude: 47.9,
            longitude: -122.3,
            altitude_msl: alt_msl,
            vertical_speed: vs,
            ground_speed: 120.0,
            heading: 90.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_clear_terrain_no_alert() {
        let mut guard = TerrainGuard::new(Box::new(FlatTerrain(0.0)));
        let assessment = guard.check_at(&cruising(5500.0, 0.0), Instant::now());
        assert_eq!(assessment.level, TawsLevel::None);
        assert!(assessment.worst_clearance_ft.unwrap() > CAUTION_CLEARANCE_FT);
    }

    #[test]
    fn test_caution_band() {
        let mut guard = TerrainGuard::new(Box::new(FlatTerrain(4000.0)));
        let assessment = guard.check_at(&cruising(5000.0, 0.0), Instant::now());
        assert_eq!(assessment.level, TawsLevel::Caution);
        assert!(assessment.escape_altitude_ft.is_none());
    }

    #[test]
    fn test_warning_commands_escape_altitude() {
        let mut guard = TerrainGuard::new(Box::new(FlatTerrain(4800.0)));
        let assessment = guard.check_at(&cruising(5000.0, 0.0), Instant::now());
        assert_eq!(assessment.level, TawsLevel::Warning);
        assert_eq!(assessment.escape_altitude_ft, Some(4800.0 + ESCAPE_MARGIN_FT));
    }

    #[test]
    fn test_descent_degrades_predicted_clearance() {
        // Level flight clears the ridge; a 1000 fpm descent does not
        let mut level_guard = TerrainGuard::new(Box::new(FlatTerrain(3000.0)));
        let level = level_guard.check_at(&cruising(5500.0, 0.0), Instant::now());
        assert_eq!(level.level, TawsLevel::None);

        let mut sink_guard = TerrainGuard::new(Box::new(FlatTerrain(3000.0)));
        let sinking = sink_guard.check_at(&cruising(5500.0, -1000.0), Instant::now());
        assert_eq!(sinking.level, TawsLevel::Warning);
    }

    #[test]
    fn test_check_interval_caches_assessment() {
        let base = Instant::now();
        let mut guard = TerrainGuard::new(Box::new(FlatTerrain(4800.0)));

        let first = guard.check_at(&cruising(5000.0, 0.0), base);
        assert_eq!(first.level, TawsLevel::Warning);

        // Aircraft climbed clear, but inside the 2 s window the cached
        // assessment holds
        let cached = guard.check_at(&cruising(9000.0, 0.0), base + Duration::from_millis(500));
        assert_eq!(cached.level, TawsLevel::Warning);

        // After the interval the sweep reruns
        let fresh = guard.check_at(&cruising(9000.0, 0.0), base + Duration::from_secs(3));
        assert_eq!(fresh.level, TawsLevel::None);
    }

    #[test]
    fn test_external_taws_merges_by_max_severity() {
        let mut guard = TerrainGuard::new(Box::new(FlatTerrain(0.0)));
        let mut snap = cruising(8000.0, 0.0);
        snap.taws_level = TawsLevel::Warning;

        let assessment = guard.check_at(&snap, Instant::now());
        assert_eq!(assessment.level, TawsLevel::Warning);
    }

    #[test]
    fn test_no_coverage_degrades_to_taws_passthrough() {
        let mut guard = TerrainGuard::new(Box::new(NoTerrainData));
        let assessment = guard.check_at(&cruising(5000.0, -500.0), Instant::now());
        assert_eq!(assessment.level, TawsLevel::None);
        assert!(assessment.worst_clearance_ft.is_none());
    }

    #[test]
    fn test_stationary_aircraft_skips_lookahead() {
        let mut guard = TerrainGuard::new(Box::new(FlatTerrain(4900.0)));
        let mut snap = cruising(5000.0, 0.0);
        snap.ground_speed = 0.0;
        let assessment = guard.check_at(&snap, Instant::now());
        assert_eq!(assessment.level, TawsLevel::None);
    }
}
