//! `halt` command: sets or clears an operator halt for a project/config.
//!
//! A halt normally lives in the same object store the machine checks
//! mid-deploy. This binary gives every invocation a fresh in-memory
//! store, so a halt set here would never be seen by a separate `deploy`
//! process. Until a persistent backing store is wired in, the halt is
//! instead recorded under the state directory and `deploy` consults it
//! there before starting a machine execution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use fleetops_machine::lock::HaltRecord;

/// Arguments for the `halt` command.
#[derive(Args)]
pub struct HaltArgs {
    /// Project name.
    pub project_name: String,

    /// Config name.
    pub config_name: String,

    /// Reason recorded alongside the halt.
    #[arg(long, default_value = "operator request")]
    pub reason: String,

    /// Clears an existing halt instead of setting one.
    #[arg(long)]
    pub clear: bool,

    /// Directory the halt marker is recorded under.
    #[arg(long, default_value = ".fleetops")]
    pub state_dir: PathBuf,
}

/// Runs the `halt` command.
///
/// # Errors
///
/// Returns an error if the state directory cannot be written to.
pub fn run(args: &HaltArgs) -> Result<()> {
    let path = halt_path(&args.state_dir, &args.project_name, &args.config_name);

    if args.clear {
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing {}", path.display()))?;
        }
        println!("halt cleared for {}/{}", args.project_name, args.config_name);
        return Ok(());
    }

    std::fs::create_dir_all(path.parent().expect("halt_path has a parent"))?;
    let record = HaltRecord {
        created_at: Utc::now(),
        reason: args.reason.clone(),
    };
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!(
        "halt set for {}/{}: {}",
        args.project_name, args.config_name, args.reason
    );
    Ok(())
}

/// Path the halt marker for `project_name`/`config_name` is stored at.
#[must_use]
pub fn halt_path(state_dir: &Path, project_name: &str, config_name: &str) -> PathBuf {
    state_dir
        .join("halts")
        .join(format!("{project_name}__{config_name}.json"))
}

/// Reads the current halt record for `project_name`/`config_name`, if any.
///
/// # Errors
///
/// Returns an error if the marker exists but cannot be parsed.
pub fn read(state_dir: &Path, project_name: &str, config_name: &str) -> Result<Option<HaltRecord>> {
    let path = halt_path(state_dir, project_name, config_name);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_clear_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let args = HaltArgs {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            reason: "testing".to_string(),
            clear: false,
            state_dir: dir.path().to_path_buf(),
        };
        run(&args).unwrap();
        assert!(read(dir.path(), "proj", "conf").unwrap().is_some());

        let clear_args = HaltArgs {
            clear: true,
            ..args
        };
        run(&clear_args).unwrap();
        assert!(read(dir.path(), "proj", "conf").unwrap().is_none());
    }

    #[test]
    fn clearing_a_missing_halt_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = HaltArgs {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            reason: String::new(),
            clear: true,
            state_dir: dir.path().to_path_buf(),
        };
        run(&args).unwrap();
    }
}
