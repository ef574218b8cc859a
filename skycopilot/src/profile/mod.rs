//! Aircraft performance profiles.
//!
//! A profile is static configuration: book reference speeds, weights, climb
//! and descent rates, safety limits, per-phase target speeds, and takeoff
//! geometry. Subsystems observe profiles read-only; replacing a profile
//! rebuilds the affected subsystems.
//!
//! Profiles ship as built-in defaults and can be overridden from JSON
//! documents on disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a profile document.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Profile file could not be read.
    #[error("failed to read profile file: {0}")]
    Io(#[from] std::io::Error),

    /// Profile file is not valid JSON or misses required fields.
    #[error("failed to parse profile: {0}")]
    Parse(#[from] serde_json::Error),

    /// No built-in profile with the requested id.
    #[error("unknown aircraft profile id: {0}")]
    UnknownId(String),
}

/// Book reference speeds in knots indicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSpeeds {
    /// Stall speed, landing configuration.
    pub vs0: f64,
    /// Stall speed, clean configuration.
    pub vs1: f64,
    /// Maneuvering speed at max gross weight.
    pub va: f64,
    /// Maximum structural cruise speed.
    pub vno: f64,
    /// Never-exceed speed.
    pub vne: f64,
    /// Rotation speed.
    pub vr: f64,
    /// Best rate of climb speed.
    pub vy: f64,
    /// Normal cruise speed.
    pub vcruise: f64,
    /// Maximum flap extension speed.
    pub vfe: f64,
    /// Final approach speed.
    pub vapp: f64,
}

impl Default for ReferenceSpeeds {
    fn default() -> Self {
        // Cessna 172S book numbers
        Self {
            vs0: 40.0,
            vs1: 53.0,
            va: 99.0,
            vno: 129.0,
            vne: 163.0,
            vr: 55.0,
            vy: 74.0,
            vcruise: 110.0,
            vfe: 85.0,
            vapp: 65.0,
        }
    }
}

/// Weight and loading figures in pounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightProfile {
    /// Empty weight.
    pub empty_lb: f64,
    /// Maximum gross weight.
    pub max_gross_lb: f64,
    /// Fuel density in pounds per gallon.
    pub fuel_density_lb_per_gal: f64,
    /// Default usable fuel load in gallons.
    pub default_fuel_gal: f64,
    /// Default payload (crew + bags).
    pub default_payload_lb: f64,
}

impl Default for WeightProfile {
    fn default() -> Self {
        Self {
            empty_lb: 1680.0,
            max_gross_lb: 2550.0,
            fuel_density_lb_per_gal: 6.0,
            default_fuel_gal: 40.0,
            default_payload_lb: 400.0,
        }
    }
}

/// Target climb and descent rates in feet per minute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbProfile {
    /// Normal climb rate.
    pub climb_rate_fpm: f64,
    /// Normal descent rate (negative).
    pub descent_rate_fpm: f64,
}

impl Default for ClimbProfile {
    fn default() -> Self {
        Self {
            climb_rate_fpm: 700.0,
            descent_rate_fpm: -500.0,
        }
    }
}

/// Hard safety limits the rule engine and command queue enforce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Maximum bank angle in degrees.
    pub max_bank_deg: f64,
    /// Maximum nose-up pitch in degrees.
    pub max_pitch_up_deg: f64,
    /// Maximum nose-down pitch in degrees (negative).
    pub max_pitch_down_deg: f64,
    /// Maximum commanded vertical speed in fpm.
    pub max_vs_fpm: f64,
    /// Minimum commanded vertical speed in fpm (negative).
    pub min_vs_fpm: f64,
    /// Service ceiling in feet MSL.
    pub ceiling_ft: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_bank_deg: 30.0,
            max_pitch_up_deg: 15.0,
            max_pitch_down_deg: -10.0,
            max_vs_fpm: 1000.0,
            min_vs_fpm: -1500.0,
            ceiling_ft: 14_000.0,
        }
    }
}

/// Per-phase target speeds in knots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSpeeds {
    /// Climb target speed.
    pub climb: f64,
    /// Cruise target speed.
    pub cruise: f64,
    /// Descent target speed.
    pub descent: f64,
    /// Approach target speed.
    pub approach: f64,
    /// Taxi target ground speed.
    pub taxi: f64,
}

impl Default for PhaseSpeeds {
    fn default() -> Self {
        Self {
            climb: 79.0,
            cruise: 110.0,
            descent: 110.0,
            approach: 65.0,
            taxi: 15.0,
        }
    }
}

/// Takeoff geometry and tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeoffProfile {
    /// AGL at which the initial climb ends and departure cleanup begins.
    pub initial_climb_agl_ft: f64,
    /// AGL at which takeoff flaps retract.
    pub flap_retract_agl_ft: f64,
    /// Most negative (nose-up) elevator commanded during rotation, percent.
    pub rotate_elevator_floor_pct: f64,
    /// Pitch target held during liftoff, degrees.
    pub liftoff_pitch_deg: f64,
}

impl Default for TakeoffProfile {
    fn default() -> Self {
        Self {
            initial_climb_agl_ft: 500.0,
            flap_retract_agl_ft: 300.0,
            rotate_elevator_floor_pct: -8.0,
            liftoff_pitch_deg: 7.5,
        }
    }
}

/// Complete aircraft performance profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AircraftProfile {
    /// Short identifier (e.g. "c172").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Reference speeds.
    pub speeds: ReferenceSpeeds,
    /// Weight figures.
    pub weight: WeightProfile,
    /// Climb/descent targets.
    pub climb: ClimbProfile,
    /// Safety limits.
    pub limits: SafetyLimits,
    /// Per-phase target speeds.
    pub phase_speeds: PhaseSpeeds,
    /// Takeoff geometry.
    pub takeoff: TakeoffProfile,
}

impl Default for AircraftProfile {
    fn default() -> Self {
        Self::cessna_172()
    }
}

impl AircraftProfile {
    /// The baseline Cessna 172S profile.
    pub fn cessna_172() -> Self {
        Self {
            id: "c172".to_string(),
            name: "Cessna 172S Skyhawk".to_string(),
            speeds: ReferenceSpeeds::default(),
            weight: WeightProfile::default(),
            climb: ClimbProfile::default(),
            limits: SafetyLimits::default(),
            phase_speeds: PhaseSpeeds::default(),
            takeoff: TakeoffProfile::default(),
        }
    }

    /// A faster four-seat cruiser profile.
    pub fn sr22() -> Self {
        Self {
            id: "sr22".to_string(),
            name: "Cirrus SR22".to_string(),
            speeds: ReferenceSpeeds {
                vs0: 60.0,
                vs1: 73.0,
                va: 133.0,
                vno: 177.0,
                vne: 205.0,
                vr: 73.0,
                vy: 101.0,
                vcruise: 170.0,
                vfe: 104.0,
                vapp: 80.0,
            },
            weight: WeightProfile {
                empty_lb: 2250.0,
                max_gross_lb: 3600.0,
                fuel_density_lb_per_gal: 6.0,
                default_fuel_gal: 60.0,
                default_payload_lb: 450.0,
            },
            climb: ClimbProfile {
                climb_rate_fpm: 1000.0,
                descent_rate_fpm: -700.0,
            },
            limits: SafetyLimits {
                max_bank_deg: 30.0,
                max_pitch_up_deg: 15.0,
                max_pitch_down_deg: -10.0,
                max_vs_fpm: 1500.0,
                min_vs_fpm: -2000.0,
                ceiling_ft: 17_500.0,
            },
            phase_speeds: PhaseSpeeds {
                climb: 110.0,
                cruise: 170.0,
                descent: 165.0,
                approach: 80.0,
                taxi: 15.0,
            },
            takeoff: TakeoffProfile {
                initial_climb_agl_ft: 500.0,
                flap_retract_agl_ft: 400.0,
                rotate_elevator_floor_pct: -7.0,
                liftoff_pitch_deg: 8.0,
            },
        }
    }

    /// Look up a built-in profile by id.
    pub fn builtin(id: &str) -> Result<Self, ProfileError> {
        match id.to_ascii_lowercase().as_str() {
            "c172" => Ok(Self::cessna_172()),
            "sr22" => Ok(Self::sr22()),
            other => Err(ProfileError::UnknownId(other.to_string())),
        }
    }

    /// Ids of all built-in profiles.
    pub fn builtin_ids() -> &'static [&'static str] {
        &["c172", "sr22"]
    }

    /// Load a profile from a JSON document.
    pub fn load_from_file(path: &Path) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Estimated operating weight: empty + default fuel + default payload.
    ///
    /// Telemetry carries no fuel state, so the envelope works from the
    /// default loading, clamped to max gross.
    pub fn estimated_weight_lb(&self) -> f64 {
        let w = self.weight.empty_lb
            + self.weight.default_fuel_gal * self.weight.fuel_density_lb_per_gal
            + self.weight.default_payload_lb;
        w.min(self.weight.max_gross_lb)
    }
}
