//! Wind compensation and turbulence detection.
//!
//! The wind triangle turns a desired ground track into the heading that
//! actually flies it given the current wind vector. The turbulence detector
//! watches vertical-speed variance over a short rolling window and grades it
//! into advisory levels.
//!
//! Wind direction throughout is the vector heading of the air mass (the
//! direction the air moves toward), matching the simulator feed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::geo::normalize_heading;

/// Rolling window length for the turbulence detector.
const TURBULENCE_WINDOW: usize = 20;

/// Minimum interval between vertical-speed samples.
const TURBULENCE_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// VS standard deviation (fpm) at which turbulence counts as light.
const TURBULENCE_LIGHT_SD_FPM: f64 = 150.0;

/// VS standard deviation (fpm) at which turbulence counts as moderate.
const TURBULENCE_MODERATE_SD_FPM: f64 = 350.0;

/// VS standard deviation (fpm) at which turbulence counts as severe.
const TURBULENCE_SEVERE_SD_FPM: f64 = 700.0;

/// Heading that flies `desired_track_deg` through the given wind.
///
/// Solves the wind triangle: the crab angle is `asin((W/TAS)·sin(w − d))`
/// applied against the drift. Degenerate inputs (wind at or above TAS,
/// zero TAS) clamp the crab angle instead of failing.
pub fn wind_corrected_heading(
    desired_track_deg: f64,
    tas_kt: f64,
    wind_dir_deg: f64,
    wind_speed_kt: f64,
) -> f64 {
    if tas_kt <= 0.0 || wind_speed_kt <= 0.0 {
        return normalize_heading(desired_track_deg);
    }

    let ratio =
        (wind_speed_kt / tas_kt * (wind_dir_deg - desired_track_deg).to_radians().sin()).clamp(-1.0, 1.0);
    normalize_heading(desired_track_deg - ratio.asin().to_degrees())
}

/// Crosswind component across `track_deg`, knots. Positive = wind from the
/// right of track.
pub fn crosswind_component(track_deg: f64, wind_dir_deg: f64, wind_speed_kt: f64) -> f64 {
    wind_speed_kt * (track_deg - wind_dir_deg).to_radians().sin()
}

/// Headwind component along `track_deg`, knots. Positive = headwind,
/// negative = tailwind.
pub fn headwind_component(track_deg: f64, wind_dir_deg: f64, wind_speed_kt: f64) -> f64 {
    -wind_speed_kt * (wind_dir_deg - track_deg).to_radians().cos()
}

/// Resulting ground track and ground speed for a heading flown through wind.
///
/// Inverse of [`wind_corrected_heading`]; the pair is used to verify the
/// triangle closes.
pub fn ground_track(
    heading_deg: f64,
    tas_kt: f64,
    wind_dir_deg: f64,
    wind_speed_kt: f64,
) -> (f64, f64) {
    let east = tas_kt * heading_deg.to_radians().sin() + wind_speed_kt * wind_dir_deg.to_radians().sin();
    let north = tas_kt * heading_deg.to_radians().cos() + wind_speed_kt * wind_dir_deg.to_radians().cos();

    let gs = (east * east + north * north).sqrt();
    (normalize_heading(east.atan2(north).to_degrees()), gs)
}

/// Turbulence severity from vertical-speed variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TurbulenceLevel {
    /// Smooth air.
    #[default]
    None,
    /// Light chop.
    Light,
    /// Moderate turbulence.
    Moderate,
    /// Severe turbulence.
    Severe,
}

impl std::fmt::Display for TurbulenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurbulenceLevel::None => write!(f, "none"),
            TurbulenceLevel::Light => write!(f, "light"),
            TurbulenceLevel::Moderate => write!(f, "moderate"),
            TurbulenceLevel::Severe => write!(f, "severe"),
        }
    }
}

/// Detects turbulence from the spread of recent vertical-speed samples.
#[derive(Debug)]
pub struct TurbulenceDetector {
    samples: VecDeque<f64>,
    last_sample_time: Option<Instant>,
}

impl TurbulenceDetector {
    /// Create an empty detector.
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(TURBULENCE_WINDOW),
            last_sample_time: None,
        }
    }

    /// Record a vertical-speed sample (fpm), rate-limited to the sample
    /// interval. Returns true if the sample was accepted.
    pub fn record(&mut self, vertical_speed_fpm: f64) -> bool {
        self.record_at(vertical_speed_fpm, Instant::now())
    }

    /// Record with an explicit timestamp.
    pub fn record_at(&mut self, vertical_speed_fpm: f64, now: Instant) -> bool {
        if let Some(last) = self.last_sample_time {
            if now.duration_since(last) < TURBULENCE_SAMPLE_INTERVAL {
                return false;
            }
        }

        self.samples.push_back(vertical_speed_fpm);
        self.last_sample_time = Some(now);

        while self.samples.len() > TURBULENCE_WINDOW {
            self.samples.pop_front();
        }

        true
    }

    /// Standard deviation of the sampled vertical speeds, fpm.
    pub fn vs_deviation(&self) -> f64 {
        let n = self.samples.len();
        if n < 4 {
            return 0.0;
        }

        let mean = self.samples.iter().sum::<f64>() / n as f64;
        let variance =
            self.samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        variance.sqrt()
    }

    /// Current turbulence grade.
    pub fn level(&self) -> TurbulenceLevel {
        let sd = self.vs_deviation();
        if sd >= TURBULENCE_SEVERE_SD_FPM {
            TurbulenceLevel::Severe
        } else if sd >= TURBULENCE_MODERATE_SD_FPM {
            TurbulenceLevel::Moderate
        } else if sd >= TURBULENCE_LIGHT_SD_FPM {
            TurbulenceLevel::Light
        } else {
            TurbulenceLevel::None
        }
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_sample_time = None;
    }
}

impl Default for TurbulenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wind_correction_crosswind_from_right() {
        // Track 090, TAS 120, wind vector toward 360 at 20 kt
        let heading = wind_corrected_heading(90.0, 120.0, 360.0, 20.0);
        assert!((heading - 99.59).abs() < 0.1, "expected ~099.6, got {}", heading);
    }

    #[test]
    fn test_wind_correction_round_trip() {
        let heading = wind_corrected_heading(90.0, 120.0, 360.0, 20.0);
        let (track, _gs) = ground_track(heading, 120.0, 360.0, 20.0);
        assert!((track - 90.0).abs() < 0.5, "triangle must close: track {}", track);
    }

    #[test]
    fn test_wind_components() {
        // Same S7 geometry: pure crosswind from the right, zero headwind
        let xw = crosswind_component(90.0, 360.0, 20.0);
        let hw = headwind_component(90.0, 360.0, 20.0);
        assert!((xw - 20.0).abs() < 1e-9);
        assert!(hw.abs() < 1e-9);
    }

    #[test]
    fn test_headwind_and_tailwind() {
        // Air mass moving toward 270 opposes an eastbound track
        assert!((headwind_component(90.0, 270.0, 15.0) - 15.0).abs() < 1e-9);
        // Air mass moving toward 090 pushes an eastbound track along
        assert!((headwind_component(90.0, 90.0, 15.0) + 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_wind_heading_equals_track() {
        assert_eq!(wind_corrected_heading(137.0, 110.0, 0.0, 0.0), 137.0);
    }

    #[test]
    fn test_overwhelming_wind_clamps() {
        // Wind faster than TAS: crab angle clamps at 90° instead of NaN
        let heading = wind_corrected_heading(90.0, 50.0, 360.0, 80.0);
        assert!(heading.is_finite());
    }

    #[test]
    fn test_turbulence_smooth_air() {
        let mut detector = TurbulenceDetector::new();
        let base = Instant::now();
        for i in 0..10 {
            detector.record_at(500.0, base + Duration::from_secs(i));
        }
        assert_eq!(detector.level(), TurbulenceLevel::None);
    }

    #[test]
    fn test_turbulence_alternating_vs() {
        let mut detector = TurbulenceDetector::new();
        let base = Instant::now();
        for i in 0..10 {
            let vs = if i % 2 == 0 { 800.0 } else { -800.0 };
            detector.record_at(vs, base + Duration::from_secs(i));
        }
        assert_eq!(detector.level(), TurbulenceLevel::Severe);
    }

    #[test]
    fn test_turbulence_needs_samples() {
        let mut detector = TurbulenceDetector::new();
        let base = Instant::now();
        detector.record_at(900.0, base);
        detector.record_at(-900.0, base + Duration::from_secs(1));
        // Too few samples to grade
        assert_eq!(detector.level(), TurbulenceLevel::None);
    }

    #[test]
    fn test_turbulence_sample_rate_limit() {
        let mut detector = TurbulenceDetector::new();
        let base = Instant::now();
        assert!(detector.record_at(100.0, base));
        assert!(!detector.record_at(200.0, base + Duration::from_millis(100)));
        assert!(detector.record_at(200.0, base + Duration::from_millis(600)));
    }

    #[test]
    fn test_turbulence_clear() {
        let mut detector = TurbulenceDetector::new();
        let base = Instant::now();
        for i in 0..8 {
            let vs = if i % 2 == 0 { 600.0 } else { -600.0 };
            detector.record_at(vs, base + Duration::from_secs(i));
        }
        assert!(detector.level() > TurbulenceLevel::None);
        detector.clear();
        assert_eq!(detector.level(), TurbulenceLevel::None);
    }
}
