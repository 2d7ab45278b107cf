//! `fails` command: lists recorded deploy executions that did not succeed.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::history;

/// Arguments for the `fails` command.
#[derive(Args)]
pub struct FailsArgs {
    /// Directory the deploy history was recorded into.
    #[arg(long, default_value = ".fleetops")]
    pub state_dir: PathBuf,

    /// Output format: text, json.
    #[arg(long, default_value = "text")]
    pub output: String,
}

/// Runs the `fails` command.
///
/// # Errors
///
/// Returns an error if the history file exists but cannot be read.
pub fn run(args: &FailsArgs) -> Result<()> {
    let failures: Vec<_> = history::read_all(&args.state_dir)?
        .into_iter()
        .filter(|record| record.outcome != "success")
        .collect();

    if args.output == "json" {
        println!("{}", serde_json::to_string_pretty(&failures)?);
        return Ok(());
    }

    if failures.is_empty() {
        println!("no failed deploys recorded");
        return Ok(());
    }

    for record in &failures {
        println!(
            "{}  {}/{}  {}  {}",
            record.name,
            record.project_name,
            record.config_name,
            record.outcome,
            record.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
