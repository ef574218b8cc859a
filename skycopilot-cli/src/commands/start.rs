//! Start command - run the autopilot loop against a telemetry stream.
//!
//! Speaks JSON lines: each stdin line is a telemetry snapshot, each stdout
//! line is a wire command for the bridge (`{"command": ...}` or
//! `{"command": ..., "value": ...}`). Any in-process bridge can adapt to
//! this pipe without the core knowing its transport.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::{info, warn};

use skycopilot::atc::{HttpTaxiPlanner, TaxiPlanner};
use skycopilot::command::{CommandSink, TransportError, WireCommand};
use skycopilot::config::ConfigFile;
use skycopilot::profile::AircraftProfile;
use skycopilot::telemetry::TelemetrySnapshot;
use skycopilot::terrain::NoTerrainData;
use skycopilot::{Supervisor, SupervisorConfig};

use crate::error::CliError;

/// Arguments for the start command.
#[derive(Args)]
pub struct StartArgs {
    /// Aircraft profile id (overrides the config file).
    #[arg(long)]
    pub profile: Option<String>,

    /// Target cruise altitude in feet MSL.
    #[arg(long)]
    pub cruise_alt: Option<f64>,

    /// Field elevation in feet MSL.
    #[arg(long)]
    pub field_elevation: Option<f64>,

    /// Departure airport ICAO; requests taxi clearance at startup.
    #[arg(long, requires = "runway")]
    pub airport: Option<String>,

    /// Departure runway ident (e.g. 16R).
    #[arg(long, requires = "airport")]
    pub runway: Option<String>,
}

/// Sink writing wire commands as JSON lines on stdout.
struct JsonLineSink {
    stdout: std::io::Stdout,
}

impl CommandSink for JsonLineSink {
    fn send(&mut self, wire: &WireCommand) -> Result<(), TransportError> {
        let line = match wire.value {
            Some(value) => serde_json::json!({ "command": wire.event, "value": value }),
            None => serde_json::json!({ "command": wire.event }),
        };
        let mut handle = self.stdout.lock();
        writeln!(handle, "{}", line).map_err(|_| TransportError::Unavailable)?;
        handle.flush().map_err(|_| TransportError::Unavailable)
    }
}

/// Run the start command.
pub fn run(args: StartArgs) -> Result<(), CliError> {
    let config = ConfigFile::load_or_default();

    // Resolve the profile: CLI > config file > C172 default
    let profile = match args.profile.as_deref().or({
        let id = config.aircraft.profile_id.as_str();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }) {
        Some(id) => AircraftProfile::builtin(id)?,
        None => match &config.aircraft.profile_file {
            Some(path) => AircraftProfile::load_from_file(path)?,
            None => AircraftProfile::cessna_172(),
        },
    };

    let supervisor_config = SupervisorConfig {
        target_cruise_alt_ft: args.cruise_alt.unwrap_or(config.control.target_cruise_alt_ft),
        field_elevation_ft: args.field_elevation.unwrap_or(config.control.field_elevation_ft),
        rate_limit: Duration::from_millis(config.control.rate_limit_ms),
    };

    info!(
        profile = %profile.id,
        cruise_alt = supervisor_config.target_cruise_alt_ft,
        "Starting autopilot core"
    );

    let sink = JsonLineSink {
        stdout: std::io::stdout(),
    };
    let mut supervisor = Supervisor::new(
        profile,
        supervisor_config,
        Box::new(sink),
        Box::new(NoTerrainData),
    );

    // Optional departure clearance through the external planner
    if let (Some(airport), Some(runway)) = (&args.airport, &args.runway) {
        supervisor.activate_atc();
        supervisor
            .request_taxi_clearance(airport, runway)
            .map_err(|e| CliError::Config(e.to_string()))?;

        let planner = HttpTaxiPlanner::new(&config.services.planner_url);
        let runtime = tokio::runtime::Runtime::new().map_err(CliError::Io)?;
        let result = runtime.block_on(planner.plan(airport, 0.0, 0.0, runway));
        supervisor.deliver_taxi_route(result);
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("failed to install signal handler: {}", e)))?;

    // Telemetry pipe: one JSON snapshot per line
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let snapshot: TelemetrySnapshot = match serde_json::from_str(&line) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Skipping malformed telemetry line");
                continue;
            }
        };

        supervisor.tick(&snapshot);
    }

    info!("Autopilot core stopped");
    Ok(())
}
