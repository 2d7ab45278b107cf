//! `deploy` command: starts (or joins) a machine execution for a release.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use fleetops_audit::{AuditLogger, DeployEvent, TracingBackend};
use fleetops_core::release::Release;
use fleetops_machine::{Machine, MachineConfig};
use fleetops_metrics::DeployMetrics;
use fleetops_resources::cloud::InMemoryCloudResources;
use fleetops_resources::{MemoryObjectStore, ObjectStore};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::{Timestamp, Uuid};

use crate::commands::halt;
use crate::history::{self, DeployRecord};

/// Arguments for the `deploy` command.
#[derive(Args)]
pub struct DeployArgs {
    /// Path to the release document.
    pub release_file: PathBuf,

    /// Path to the sidecar user-data file.
    pub userdata_file: PathBuf,

    /// Directory the deploy history is recorded into.
    #[arg(long, default_value = ".fleetops")]
    pub state_dir: PathBuf,

    /// Output format: text, json.
    #[arg(long, default_value = "text")]
    pub output: String,
}

/// Runs the `deploy` command: uploads the release document and user-data to
/// the release's bucket, then drives it through the deploy state machine.
///
/// # Errors
///
/// Returns an error if the files cannot be read or parsed.
pub async fn run(args: &DeployArgs) -> Result<bool> {
    let document = std::fs::read_to_string(&args.release_file)
        .with_context(|| format!("reading {}", args.release_file.display()))?;
    let userdata = std::fs::read_to_string(&args.userdata_file)
        .with_context(|| format!("reading {}", args.userdata_file.display()))?;

    let mut release =
        Release::from_json(&document).context("parsing release document")?;

    if let Some(record) = halt::read(&args.state_dir, &release.project_name, &release.config_name)? {
        anyhow::bail!(
            "{}/{} is halted: {}",
            release.project_name,
            release.config_name,
            record.reason
        );
    }

    let execution_uuid = Uuid::new_v7(Timestamp::now(uuid::NoContext)).to_string();
    release.uuid = execution_uuid.clone();

    let mut hasher = Sha256::new();
    hasher.update(userdata.as_bytes());
    release.user_data_sha256 = hex::encode(hasher.finalize());

    let name = format!(
        "deploy-{}-{}-{}",
        release.project_name, release.config_name, execution_uuid
    );
    info!(name, release_id = %release.release_id, "starting machine execution");

    let object_store = MemoryObjectStore::default();
    let release_key = format!(
        "{}/{}/{}/release.json",
        release.project_name, release.config_name, release.release_id
    );
    let userdata_key = format!(
        "{}/{}/{}/userdata",
        release.project_name, release.config_name, release.release_id
    );
    object_store
        .put(&release_key, document.as_bytes())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    object_store
        .put(&userdata_key, userdata.as_bytes())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let cloud = InMemoryCloudResources::default();
    let config = MachineConfig::default();
    let machine = Machine::new(&config);

    let audit = AuditLogger::builder().with_backend(Arc::new(TracingBackend::new())).build();
    let metrics = DeployMetrics::new().context("building metrics registry")?;

    audit
        .log(&DeployEvent::deploy_started(
            &release.project_name,
            &release.config_name,
            &release.release_id,
            &execution_uuid,
        ))
        .ok();

    let started_at = Instant::now();
    let finished = machine.run(release, &object_store, &cloud).await;
    let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

    let record = DeployRecord::from_release(&name, &finished);
    history::append(&args.state_dir, &record)?;

    metrics.record_outcome(&record.outcome);
    audit
        .log(&DeployEvent::terminal(
            &finished.project_name,
            &finished.config_name,
            &finished.release_id,
            &execution_uuid,
            finished.success,
            record.outcome == "failure_dirty",
            elapsed_ms,
            finished.error.as_ref().map(|e| e.kind.as_str()),
        ))
        .ok();

    if args.output == "json" {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_text(&record);
    }

    Ok(finished.success)
}

fn print_text(record: &DeployRecord) {
    println!("deploy {}", record.name);
    println!("  release:  {}", record.release_id);
    println!("  project:  {}/{}", record.project_name, record.config_name);
    println!("  outcome:  {}", record.outcome);
    if let Some(error) = &record.error {
        println!("  error:    {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetops_core::release::ReleaseError;

    #[test]
    fn deploy_record_reports_success() {
        let mut release = sample_release();
        release.success = true;
        let record = DeployRecord::from_release("deploy-p-c-u1", &release);
        assert_eq!(record.outcome, "success");
        assert!(record.error.is_none());

        release.success = false;
        release.error = Some(ReleaseError {
            kind: "BadReleaseError".to_string(),
            message: "bad".to_string(),
        });
        let record = DeployRecord::from_release("deploy-p-c-u1", &release);
        assert_eq!(record.outcome, "failure_clean");
    }

    fn sample_release() -> Release {
        Release::from_json(
            &serde_json::json!({
                "release_id": "r-1",
                "project_name": "proj",
                "config_name": "conf",
                "account_id": "1",
                "region": "us-east-1",
                "bucket": "bucket",
                "timeout_seconds": 1800,
                "ami": "ami-1",
                "subnets": ["subnet-1"],
                "services": {}
            })
            .to_string(),
        )
        .unwrap()
    }
}
