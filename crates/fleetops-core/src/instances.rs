//! Per-instance health aggregation.
//!
//! A scaling group's instances are observed from up to three angles: the
//! scaling group itself, any attached classic load balancers, and any
//! attached target groups. Each angle may disagree about a given instance's
//! health; [`Instances::merge`] combines them under a worst-wins rule so
//! that aggregating more views never makes an instance look healthier than
//! its worst-reported state.

use std::collections::HashMap;

/// The health state of a single instance as reported by one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum InstanceState {
    /// Instance is in service and passing health checks.
    Healthy,
    /// Instance is in service but failing health checks, or not yet in
    /// service.
    Unhealthy,
    /// Instance is being terminated.
    Terminating,
}

impl InstanceState {
    /// Returns the worse of two states, where `Terminating > Unhealthy >
    /// Healthy`. This ordering is what `Instances::merge` relies on to stay
    /// monotone under repeated merging.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// A mapping from instance id to its merged health state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instances {
    states: HashMap<String, InstanceState>,
}

impl Instances {
    /// Creates an empty instance map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an instance's state as reported by its owning scaling group.
    pub fn add_asg_instance(&mut self, id: impl Into<String>, state: InstanceState) {
        self.record(id.into(), state);
    }

    /// Records an instance's state as reported by an attached classic load
    /// balancer.
    pub fn add_elb_instance(&mut self, id: impl Into<String>, state: InstanceState) {
        self.record(id.into(), state);
    }

    /// Records an instance's state as reported by an attached target group.
    pub fn add_target_group_instance(&mut self, id: impl Into<String>, state: InstanceState) {
        self.record(id.into(), state);
    }

    fn record(&mut self, id: String, state: InstanceState) {
        self.states
            .entry(id)
            .and_modify(|existing| *existing = existing.worst(state))
            .or_insert(state);
    }

    /// Merges `other` into a copy of `self`, taking the worst state per
    /// instance id. Commutative: `a.merge(&b) == b.merge(&a)`.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (id, state) in &other.states {
            merged.record(id.clone(), *state);
        }
        merged
    }

    /// Total number of distinct instances observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no instances have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of a specific instance, if known.
    #[must_use]
    pub fn state_of(&self, id: &str) -> Option<InstanceState> {
        self.states.get(id).copied()
    }

    /// All instance ids.
    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Ids of instances in the [`InstanceState::Healthy`] state.
    pub fn healthy_ids(&self) -> impl Iterator<Item = &str> {
        self.ids_in_state(InstanceState::Healthy)
    }

    /// Ids of instances in the [`InstanceState::Unhealthy`] state.
    pub fn unhealthy_ids(&self) -> impl Iterator<Item = &str> {
        self.ids_in_state(InstanceState::Unhealthy)
    }

    /// Ids of instances in the [`InstanceState::Terminating`] state.
    pub fn terminating_ids(&self) -> impl Iterator<Item = &str> {
        self.ids_in_state(InstanceState::Terminating)
    }

    fn ids_in_state(&self, target: InstanceState) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(move |(_, state)| **state == target)
            .map(|(id, _)| id.as_str())
    }

    /// Counts of healthy, unhealthy and terminating instances, in that
    /// order.
    #[must_use]
    pub fn healthy_unhealthy_terminating(&self) -> (usize, usize, usize) {
        let mut counts = (0usize, 0usize, 0usize);
        for state in self.states.values() {
            match state {
                InstanceState::Healthy => counts.0 += 1,
                InstanceState::Unhealthy => counts.1 += 1,
                InstanceState::Terminating => counts.2 += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_wins_ordering() {
        assert_eq!(
            InstanceState::Healthy.worst(InstanceState::Unhealthy),
            InstanceState::Unhealthy
        );
        assert_eq!(
            InstanceState::Unhealthy.worst(InstanceState::Terminating),
            InstanceState::Terminating
        );
        assert_eq!(
            InstanceState::Terminating.worst(InstanceState::Healthy),
            InstanceState::Terminating
        );
    }

    #[test]
    fn record_keeps_worst_seen() {
        let mut instances = Instances::new();
        instances.add_asg_instance("i-1", InstanceState::Healthy);
        instances.add_elb_instance("i-1", InstanceState::Unhealthy);
        assert_eq!(instances.state_of("i-1"), Some(InstanceState::Unhealthy));
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = Instances::new();
        a.add_asg_instance("i-1", InstanceState::Healthy);
        a.add_asg_instance("i-2", InstanceState::Terminating);

        let mut b = Instances::new();
        b.add_elb_instance("i-1", InstanceState::Unhealthy);
        b.add_elb_instance("i-3", InstanceState::Healthy);

        assert_eq!(a.merge(&b), b.merge(&a));
        let merged = a.merge(&b);
        assert_eq!(merged.state_of("i-1"), Some(InstanceState::Unhealthy));
        assert_eq!(merged.state_of("i-2"), Some(InstanceState::Terminating));
        assert_eq!(merged.state_of("i-3"), Some(InstanceState::Healthy));
    }

    #[test]
    fn healthy_unhealthy_terminating_counts() {
        let mut instances = Instances::new();
        instances.add_asg_instance("i-1", InstanceState::Healthy);
        instances.add_asg_instance("i-2", InstanceState::Healthy);
        instances.add_asg_instance("i-3", InstanceState::Unhealthy);
        instances.add_asg_instance("i-4", InstanceState::Terminating);
        assert_eq!(instances.healthy_unhealthy_terminating(), (2, 1, 1));
    }

    #[test]
    fn id_filters_match_counts() {
        let mut instances = Instances::new();
        instances.add_asg_instance("i-1", InstanceState::Healthy);
        instances.add_asg_instance("i-2", InstanceState::Terminating);
        assert_eq!(instances.healthy_ids().count(), 1);
        assert_eq!(instances.terminating_ids().count(), 1);
        assert_eq!(instances.unhealthy_ids().count(), 0);
    }
}
