//! Profiles command - list the built-in aircraft profiles.

use skycopilot::profile::AircraftProfile;

use crate::error::CliError;

/// Run the profiles command.
pub fn run() -> Result<(), CliError> {
    for id in AircraftProfile::builtin_ids() {
        let profile = AircraftProfile::builtin(id)?;
        println!(
            "{:8} {:24} Vs1 {:>3.0}  Vr {:>3.0}  Vy {:>3.0}  cruise {:>3.0} kt",
            profile.id,
            profile.name,
            profile.speeds.vs1,
            profile.speeds.vr,
            profile.speeds.vy,
            profile.speeds.vcruise,
        );
    }
    Ok(())
}
