//! Config command - inspect and initialize the configuration file.

use clap::Subcommand;

use skycopilot::config::ConfigFile;

use crate::error::CliError;

/// Config subcommand actions.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default config file if none exists.
    Init,
    /// Print the resolved configuration.
    Show,
}

/// Run the config command.
pub fn run(action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Init => {
            let path = ConfigFile::default_path()?;
            if path.exists() {
                println!("Config already exists at {}", path.display());
                return Ok(());
            }
            ConfigFile::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = ConfigFile::load_or_default();
            println!("bridge_url          = {}", config.services.bridge_url);
            println!("planner_url         = {}", config.services.planner_url);
            println!("advisory_url        = {}", config.services.advisory_url);
            println!("tick_ms             = {}", config.control.tick_ms);
            println!("rate_limit_ms       = {}", config.control.rate_limit_ms);
            println!("target_cruise_alt   = {}", config.control.target_cruise_alt_ft);
            println!("field_elevation     = {}", config.control.field_elevation_ft);
            println!(
                "profile             = {}",
                if config.aircraft.profile_id.is_empty() {
                    "c172 (default)"
                } else {
                    &config.aircraft.profile_id
                }
            );
            Ok(())
        }
    }
}
