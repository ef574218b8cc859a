//! SkyCopilot CLI - Command-line interface
//!
//! Runs the autopilot core against a simulator bridge speaking JSON lines:
//! telemetry snapshots in on stdin, wire commands out on stdout.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::{config, profiles, start};

#[derive(Parser)]
#[command(name = "skycopilot", version, about = "AI autopilot core for GA flight simulators")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the autopilot loop against a telemetry stream.
    Start(start::StartArgs),

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },

    /// List the available aircraft profiles.
    Profiles,
}

fn main() {
    let cli = Cli::parse();
    skycopilot::log::init(cli.verbose);

    let result = match cli.command {
        Commands::Start(args) => start::run(args),
        Commands::Config { action } => config::run(action),
        Commands::Profiles => profiles::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
