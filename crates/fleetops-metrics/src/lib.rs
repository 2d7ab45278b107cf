//! Prometheus metrics for the fleet deploy orchestrator.
//!
//! A single [`DeployMetrics`] instance is constructed once at process start
//! and threaded through the CLI binary alongside the audit logger. It counts
//! state transitions and terminal outcomes; [`DeployMetrics::router`] exposes
//! them on a `/metrics` endpoint for Prometheus to scrape.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors constructing or exporting metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A collector could not be registered, usually a name collision.
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Result type alias using [`MetricsError`].
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Prometheus collectors for the deploy state machine.
#[derive(Clone)]
pub struct DeployMetrics {
    registry: Registry,
    transitions: IntCounterVec,
    outcomes: IntCounterVec,
    locks_held: IntGaugeVec,
}

impl DeployMetrics {
    /// Creates a fresh registry with all collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector name collides with one already
    /// registered on the default registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let transitions = IntCounterVec::new(
            Opts::new(
                "fleetops_state_transitions_total",
                "Number of times the machine entered each state",
            ),
            &["state"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let outcomes = IntCounterVec::new(
            Opts::new(
                "fleetops_deploy_outcomes_total",
                "Number of terminal machine outcomes by kind",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(outcomes.clone()))?;

        let locks_held = IntGaugeVec::new(
            Opts::new(
                "fleetops_locks_held",
                "Whether the project/config lock is currently held (1) or not (0)",
            ),
            &["project", "config"],
        )?;
        registry.register(Box::new(locks_held.clone()))?;

        Ok(Self {
            registry,
            transitions,
            outcomes,
            locks_held,
        })
    }

    /// Records entry into `state`.
    pub fn record_transition(&self, state: &str) {
        self.transitions.with_label_values(&[state]).inc();
    }

    /// Records a terminal outcome: `"success"`, `"failure_clean"` or
    /// `"failure_dirty"`.
    pub fn record_outcome(&self, outcome: &str) {
        self.outcomes.with_label_values(&[outcome]).inc();
    }

    /// Marks the project/config lock as held.
    pub fn lock_acquired(&self, project: &str, config: &str) {
        self.locks_held.with_label_values(&[project, config]).set(1);
    }

    /// Marks the project/config lock as released.
    pub fn lock_released(&self, project: &str, config: &str) {
        self.locks_held.with_label_values(&[project, config]).set(0);
    }

    /// Renders the current state of the registry in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding the metric families fails.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Builds an axum router exposing `GET /metrics`.
    #[must_use]
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&self);
                async move { metrics.render().unwrap_or_default() }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transitions_and_outcomes() {
        let metrics = DeployMetrics::new().unwrap();
        metrics.record_transition("Validate");
        metrics.record_transition("Validate");
        metrics.record_outcome("success");

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("fleetops_state_transitions_total"));
        assert!(rendered.contains("fleetops_deploy_outcomes_total"));
    }

    #[test]
    fn lock_gauge_tracks_acquire_release() {
        let metrics = DeployMetrics::new().unwrap();
        metrics.lock_acquired("proj", "conf");
        let held = metrics.render().unwrap();
        assert!(held.contains("fleetops_locks_held"));

        metrics.lock_released("proj", "conf");
        let released = metrics.render().unwrap();
        assert!(released.contains("fleetops_locks_held"));
    }
}
