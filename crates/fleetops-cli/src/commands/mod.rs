//! CLI commands and argument parsing.

pub mod deploy;
pub mod fails;
pub mod halt;
pub mod json;

use clap::{Parser, Subcommand};

/// fleetops - VM fleet deploy orchestrator
#[derive(Parser)]
#[command(name = "fleetops")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a release, driving it through the state machine to completion
    Deploy(deploy::DeployArgs),

    /// Set or clear an operator halt for a project/config
    Halt(halt::HaltArgs),

    /// List recorded deploy executions that did not succeed
    Fails(fails::FailsArgs),

    /// Print the state machine's transition graph as JSON
    Json,

    /// Print version information
    Version,
}
