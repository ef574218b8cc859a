//! Application configuration file.
//!
//! Settings live in an INI file (`config.ini` under the user config
//! directory by default) with one section per concern. Every key is
//! optional; missing keys fall back to the documented defaults so a fresh
//! install runs without any file at all.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

/// Default simulator bridge endpoint.
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8620";

/// Default tick interval in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 250;

/// Default command rate limit in milliseconds.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 500;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid INI.
    #[error("config parse error: {0}")]
    Parse(String),

    /// No config directory could be determined.
    #[error("no configuration directory available")]
    NoConfigDir,
}

/// External service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    /// Simulator bridge base URL.
    pub bridge_url: String,
    /// Taxi-route planner base URL.
    pub planner_url: String,
    /// LLM advisory base URL.
    pub advisory_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            planner_url: DEFAULT_BRIDGE_URL.to_string(),
            advisory_url: DEFAULT_BRIDGE_URL.to_string(),
        }
    }
}

/// Control-loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// Tick interval, milliseconds.
    pub tick_ms: u64,
    /// Non-axis command rate limit, milliseconds.
    pub rate_limit_ms: u64,
    /// Target cruise altitude, feet MSL.
    pub target_cruise_alt_ft: f64,
    /// Field elevation, feet MSL.
    pub field_elevation_ft: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            target_cruise_alt_ft: 5500.0,
            field_elevation_ft: 0.0,
        }
    }
}

/// Aircraft selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AircraftConfig {
    /// Built-in profile id (e.g. "c172").
    pub profile_id: String,
    /// Optional JSON profile overriding the built-in.
    pub profile_file: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    /// Service endpoints.
    pub services: ServicesConfig,
    /// Control-loop settings.
    pub control: ControlConfig,
    /// Aircraft selection.
    pub aircraft: AircraftConfig,
}

impl ConfigFile {
    /// The default config file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("skycopilot").join("config.ini"))
    }

    /// Load from a file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("services")) {
            if let Some(url) = section.get("bridge_url") {
                config.services.bridge_url = url.to_string();
            }
            if let Some(url) = section.get("planner_url") {
                config.services.planner_url = url.to_string();
            }
            if let Some(url) = section.get("advisory_url") {
                config.services.advisory_url = url.to_string();
            }
        }

        if let Some(section) = ini.section(Some("control")) {
            if let Some(v) = section.get("tick_ms").and_then(|v| v.parse().ok()) {
                config.control.tick_ms = v;
            }
            if let Some(v) = section.get("rate_limit_ms").and_then(|v| v.parse().ok()) {
                config.control.rate_limit_ms = v;
            }
            if let Some(v) = section.get("target_cruise_alt_ft").and_then(|v| v.parse().ok()) {
                config.control.target_cruise_alt_ft = v;
            }
            if let Some(v) = section.get("field_elevation_ft").and_then(|v| v.parse().ok()) {
                config.control.field_elevation_ft = v;
            }
        }

        if let Some(section) = ini.section(Some("aircraft")) {
            if let Some(id) = section.get("profile") {
                config.aircraft.profile_id = id.to_string();
            }
            if let Some(file) = section.get("profile_file") {
                config.aircraft.profile_file = Some(PathBuf::from(file));
            }
        }

        Ok(config)
    }

    /// Load from the default location, or defaults when the file is absent.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default configuration");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Write the configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("services"))
            .set("bridge_url", self.services.bridge_url.as_str())
            .set("planner_url", self.services.planner_url.as_str())
            .set("advisory_url", self.services.advisory_url.as_str());
        ini.with_section(Some("control"))
            .set("tick_ms", self.control.tick_ms.to_string())
            .set("rate_limit_ms", self.control.rate_limit_ms.to_string())
            .set(
                "target_cruise_alt_ft",
                self.control.target_cruise_alt_ft.to_string(),
            )
            .set(
                "field_elevation_ft",
                self.control.field_elevation_ft.to_string(),
            );
        let mut aircraft = ini.with_section(Some("aircraft"));
        let aircraft = aircraft.set("profile", self.aircraft.profile_id.as_str());
        if let Some(file) = &self.aircraft.profile_file {
            aircraft.set("profile_file", file.to_string_lossy().to_string());
        }

        ini.write_to_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = ConfigFile::default();
        assert_eq!(config.services.bridge_url, DEFAULT_BRIDGE_URL);
        assert_eq!(config.control.tick_ms, DEFAULT_TICK_MS);
        assert_eq!(config.control.rate_limit_ms, DEFAULT_RATE_LIMIT_MS);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.services.planner_url = "http://10.0.0.5:9100".to_string();
        config.control.tick_ms = 100;
        config.control.target_cruise_alt_ft = 7500.0;
        config.aircraft.profile_id = "sr22".to_string();

        config.save(&path).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[control]\ntick_ms = 125\n").unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.control.tick_ms, 125);
        assert_eq!(loaded.control.rate_limit_ms, DEFAULT_RATE_LIMIT_MS);
        assert_eq!(loaded.services.bridge_url, DEFAULT_BRIDGE_URL);
    }

    #[test]
    fn test_malformed_values_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[control]\ntick_ms = not-a-number\n").unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.control.tick_ms, DEFAULT_TICK_MS);
    }

    #[test]
    fn test_missing_file_errors() {
        let err = ConfigFile::load(Path::new("/nonexistent/config.ini"));
        assert!(err.is_err());
    }
}
