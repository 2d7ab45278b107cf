//! `json` command: dumps the state machine's transition graph.

use anyhow::Result;
use fleetops_machine::state;

/// Runs the `json` command.
///
/// # Errors
///
/// Returns an error if the definition cannot be serialized.
pub fn run() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&state::definition())?);
    Ok(())
}
