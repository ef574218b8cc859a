//! Great-circle navigation math
//!
//! Provides distance, bearing, and projection helpers shared by the ATC
//! ground controller (route progress in feet), the rule engine's lateral
//! navigation (waypoint bearing/distance in nautical miles), and the terrain
//! guard (dead-reckoning look-ahead points).
//!
//! All headings and bearings are degrees in `[0, 360)`, 0 = North, 90 = East.

use std::f64::consts::PI;

/// Mean Earth radius in feet (WGS-84 mean radius, 6371 km).
pub const EARTH_RADIUS_FT: f64 = 20_902_231.0;

/// Feet per nautical mile.
pub const FT_PER_NM: f64 = 6076.115;

/// Converts feet to nautical miles.
#[inline]
pub fn ft_to_nm(ft: f64) -> f64 {
    ft / FT_PER_NM
}

/// Converts nautical miles to feet.
#[inline]
pub fn nm_to_ft(nm: f64) -> f64 {
    nm * FT_PER_NM
}

/// Normalizes a heading to `[0, 360)` degrees.
#[inline]
pub fn normalize_heading(heading_deg: f64) -> f64 {
    let h = heading_deg % 360.0;
    if h < 0.0 {
        h + 360.0
    } else {
        h
    }
}

/// Signed shortest-turn error from `current` to `target` in degrees.
///
/// Positive means the target is to the right of the current heading.
/// Result is in `[-180, 180]`.
#[inline]
pub fn heading_error(current_deg: f64, target_deg: f64) -> f64 {
    let mut err = normalize_heading(target_deg) - normalize_heading(current_deg);
    if err > 180.0 {
        err -= 360.0;
    } else if err < -180.0 {
        err += 360.0;
    }
    err
}

/// Great-circle distance between two points in feet (haversine).
///
/// Accurate for the short ranges this system cares about (taxi waypoint
/// capture through 10 nm terrain look-ahead).
pub fn haversine_distance_ft(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_FT * c
}

/// Great-circle distance between two points in nautical miles.
#[inline]
pub fn haversine_distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    ft_to_nm(haversine_distance_ft(lat1, lon1, lat2, lon2))
}

/// Initial great-circle bearing from point 1 to point 2, degrees `[0, 360)`.
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();

    normalize_heading(y.atan2(x) * 180.0 / PI)
}

/// Projects a point `distance_nm` along `bearing_deg` from the start point.
///
/// Used by the terrain guard to place look-ahead points along the current
/// track. Returns `(lat, lon)` in degrees.
pub fn project_point(lat: f64, lon: f64, bearing_deg: f64, distance_nm: f64) -> (f64, f64) {
    let delta = nm_to_ft(distance_nm) / EARTH_RADIUS_FT;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    (phi2.to_degrees(), normalize_heading(lambda2.to_degrees() + 180.0) - 180.0)
}
