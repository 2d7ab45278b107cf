//! On-disk record of past `deploy` executions.
//!
//! Each CLI invocation gets a fresh in-memory object store, so nothing
//! inside a single execution can answer "what deploys have failed
//! recently" across process boundaries. This module keeps a flat JSON
//! Lines file under the state directory for that purpose; `deploy`
//! appends one record per execution, `fails` reads them back.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use fleetops_core::release::Release;
use serde::{Deserialize, Serialize};

/// One completed machine execution, as recorded for later inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRecord {
    /// Name assigned to this execution (`deploy-{project}-{config}-{uuid}`).
    pub name: String,
    /// Project name.
    pub project_name: String,
    /// Config name.
    pub config_name: String,
    /// Release id.
    pub release_id: String,
    /// Execution uuid.
    pub uuid: String,
    /// `"success"`, `"failure_clean"` or `"failure_dirty"`.
    pub outcome: String,
    /// Error detail, if the outcome was not success.
    pub error: Option<String>,
}

impl DeployRecord {
    /// Builds a record from a finished [`Release`].
    #[must_use]
    pub fn from_release(name: &str, release: &Release) -> Self {
        let outcome = if release.success {
            "success"
        } else {
            match &release.error {
                Some(err) if is_dirty_kind(&err.kind) => "failure_dirty",
                _ => "failure_clean",
            }
        }
        .to_string();

        Self {
            name: name.to_string(),
            project_name: release.project_name.clone(),
            config_name: release.config_name.clone(),
            release_id: release.release_id.clone(),
            uuid: release.uuid.clone(),
            outcome,
            error: release.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

fn is_dirty_kind(kind: &str) -> bool {
    !matches!(kind, "BadReleaseError" | "LockExistsError" | "UnmarshalError")
}

const HISTORY_FILE: &str = "history.jsonl";

/// Appends `record` to the history file under `state_dir`, creating both
/// as needed.
///
/// # Errors
///
/// Returns an error if the state directory or file cannot be created or
/// written to.
pub fn append(state_dir: &Path, record: &DeployRecord) -> Result<()> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("creating {}", state_dir.display()))?;
    let path = state_dir.join(HISTORY_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Reads all recorded executions under `state_dir`, oldest first. Returns
/// an empty vec if no history file exists yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or a line fails
/// to parse.
pub fn read_all(state_dir: &Path) -> Result<Vec<DeployRecord>> {
    let path = state_dir.join(HISTORY_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file =
        std::fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let record = DeployRecord {
            name: "deploy-p-c-u1".to_string(),
            project_name: "p".to_string(),
            config_name: "c".to_string(),
            release_id: "r-1".to_string(),
            uuid: "u1".to_string(),
            outcome: "success".to_string(),
            error: None,
        };
        append(dir.path(), &record).unwrap();
        let records = read_all(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "deploy-p-c-u1");
    }

    #[test]
    fn read_all_with_no_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_all(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn dirty_kinds_are_reported_as_dirty() {
        assert!(is_dirty_kind("DetachError"));
        assert!(is_dirty_kind("CleanUpError"));
        assert!(!is_dirty_kind("BadReleaseError"));
    }
}
