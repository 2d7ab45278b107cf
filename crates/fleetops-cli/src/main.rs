//! fleetops CLI - drives releases through the deploy state machine.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod history;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => {
            let succeeded = commands::deploy::run(&args).await?;
            std::process::exit(i32::from(!succeeded));
        }
        Commands::Halt(args) => commands::halt::run(&args),
        Commands::Fails(args) => commands::fails::run(&args),
        Commands::Json => commands::json::run(),
        Commands::Version => {
            println!("fleetops {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
