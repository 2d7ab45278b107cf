//! Lifecycle hooks attached to a service's scaling group.

use serde::{Deserialize, Serialize};

/// The scaling-group transition a lifecycle hook fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Fires while an instance is launching, before it enters service.
    Launching,
    /// Fires while an instance is terminating, before it is removed.
    Terminating,
}

/// A single lifecycle hook specification. Expanded into a provider-specific
/// lifecycle hook at deploy time; not itself a cloud resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeCycleHook {
    /// Hook name; unique within a release's `lifecycle_hooks` map.
    pub name: String,
    /// Which transition this hook observes.
    pub transition: Transition,
    /// IAM role the cloud provider assumes to publish the notification.
    pub role: String,
    /// Topic or queue the notification is published to.
    pub sns: String,
    /// Seconds an instance may remain in the transition before it is
    /// abandoned.
    pub heartbeat_timeout: u32,
}

impl LifeCycleHook {
    /// Builds a new lifecycle hook.
    pub fn new(
        name: impl Into<String>,
        transition: Transition,
        role: impl Into<String>,
        sns: impl Into<String>,
        heartbeat_timeout: u32,
    ) -> Self {
        Self {
            name: name.into(),
            transition,
            role: role.into(),
            sns: sns.into(),
            heartbeat_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_given_fields() {
        let hook = LifeCycleHook::new(
            "drain",
            Transition::Terminating,
            "arn:aws:iam::1:role/hook",
            "arn:aws:sns:us-east-1:1:topic",
            300,
        );
        assert_eq!(hook.name, "drain");
        assert_eq!(hook.transition, Transition::Terminating);
        assert_eq!(hook.heartbeat_timeout, 300);
    }
}
