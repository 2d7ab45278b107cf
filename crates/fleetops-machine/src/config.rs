//! Machine-wide configuration.
//!
//! Bucket root, timeout tiers and lock/halt staleness windows are
//! constructed once at process start and threaded through every
//! execution, following this workspace's `*Config` + `*ConfigBuilder`
//! pattern.

use std::time::Duration;

use crate::lock::{HALT_STALE_AFTER, LOCK_STALE_AFTER};

/// Fixed pause after `Deploy` before the first health check.
const DEFAULT_WAIT_FOR_DEPLOY: Duration = Duration::from_secs(30);

/// Machine-wide configuration.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Object-store bucket root under which `<project>/<config>/...` keys
    /// are addressed.
    pub bucket_root: String,

    /// Fixed pause between `Deploy` and the first `CheckHealthy`.
    pub wait_for_deploy: Duration,

    /// How long a lock may sit unrefreshed before a new release may steal
    /// it.
    pub lock_stale_after: Duration,

    /// How long a halt flag survives before it's treated as cleared.
    pub halt_stale_after: Duration,

    /// Ceiling on `Release::timeout_seconds`.
    pub max_timeout_seconds: i64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            bucket_root: String::new(),
            wait_for_deploy: DEFAULT_WAIT_FOR_DEPLOY,
            lock_stale_after: LOCK_STALE_AFTER,
            halt_stale_after: HALT_STALE_AFTER,
            max_timeout_seconds: fleetops_core::release::MAX_TIMEOUT_SECONDS,
        }
    }
}

impl MachineConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> MachineConfigBuilder {
        MachineConfigBuilder::default()
    }
}

/// Builder for [`MachineConfig`].
#[derive(Debug, Default)]
pub struct MachineConfigBuilder {
    bucket_root: Option<String>,
    wait_for_deploy: Option<Duration>,
    lock_stale_after: Option<Duration>,
    halt_stale_after: Option<Duration>,
    max_timeout_seconds: Option<i64>,
}

impl MachineConfigBuilder {
    /// Sets the object-store bucket root.
    #[must_use]
    pub fn bucket_root(mut self, bucket_root: impl Into<String>) -> Self {
        self.bucket_root = Some(bucket_root.into());
        self
    }

    /// Overrides the fixed post-deploy pause.
    #[must_use]
    pub fn wait_for_deploy(mut self, duration: Duration) -> Self {
        self.wait_for_deploy = Some(duration);
        self
    }

    /// Overrides the lock staleness window.
    #[must_use]
    pub fn lock_stale_after(mut self, duration: Duration) -> Self {
        self.lock_stale_after = Some(duration);
        self
    }

    /// Overrides the halt staleness window.
    #[must_use]
    pub fn halt_stale_after(mut self, duration: Duration) -> Self {
        self.halt_stale_after = Some(duration);
        self
    }

    /// Overrides the release timeout ceiling.
    #[must_use]
    pub fn max_timeout_seconds(mut self, seconds: i64) -> Self {
        self.max_timeout_seconds = Some(seconds);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> MachineConfig {
        let defaults = MachineConfig::default();
        MachineConfig {
            bucket_root: self.bucket_root.unwrap_or(defaults.bucket_root),
            wait_for_deploy: self.wait_for_deploy.unwrap_or(defaults.wait_for_deploy),
            lock_stale_after: self.lock_stale_after.unwrap_or(defaults.lock_stale_after),
            halt_stale_after: self.halt_stale_after.unwrap_or(defaults.halt_stale_after),
            max_timeout_seconds: self
                .max_timeout_seconds
                .unwrap_or(defaults.max_timeout_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MachineConfig::default();
        assert_eq!(config.wait_for_deploy, DEFAULT_WAIT_FOR_DEPLOY);
        assert_eq!(config.lock_stale_after, LOCK_STALE_AFTER);
    }

    #[test]
    fn builder_overrides_take_effect() {
        let config = MachineConfig::builder()
            .bucket_root("fleetops-releases")
            .wait_for_deploy(Duration::from_secs(10))
            .build();
        assert_eq!(config.bucket_root, "fleetops-releases");
        assert_eq!(config.wait_for_deploy, Duration::from_secs(10));
        assert_eq!(config.halt_stale_after, HALT_STALE_AFTER);
    }
}
