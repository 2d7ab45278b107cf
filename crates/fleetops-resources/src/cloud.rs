//! The cloud-resource seam (§4.4, §4.5, §4.6, §4.7): resolving named
//! references to IDs, creating and tearing down scaling groups, and
//! reading back instance health.
//!
//! A real implementation wraps whatever SDK the deploy target exposes;
//! that wrapper is deliberately out of scope here. [`InMemoryCloudResources`]
//! is the fake used by machine-layer tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fleetops_core::instances::Instances;
use fleetops_core::lifecycle::LifeCycleHook;
use fleetops_core::policy::Policy;
use thiserror::Error;

use crate::tags::OwnershipTags;

/// Failure resolving or mutating a cloud resource.
#[derive(Error, Debug, Clone)]
pub enum CloudError {
    /// A named reference resolved to the wrong number of IDs.
    #[error("resource '{name}' resolved to {found} ids, expected exactly one")]
    AmbiguousReference {
        /// The name that was looked up.
        name: String,
        /// How many ids were actually found.
        found: usize,
    },
    /// A named reference did not resolve at all.
    #[error("resource '{name}' not found")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },
    /// Any other provider-side failure.
    #[error("cloud provider error: {reason}")]
    Provider {
        /// Underlying reason.
        reason: String,
    },
}

/// Result type alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

/// One resolved name-to-id mapping, with the tags needed for ownership
/// validation.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    /// The name that was looked up.
    pub name: String,
    /// The resolved provider id.
    pub id: String,
    /// Ownership tags carried by the resource.
    pub tags: OwnershipTags,
}

/// All resources resolved for one service during `ValidateResources`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedResources {
    /// Resolved security group ids.
    pub security_group_ids: Vec<String>,
    /// Resolved classic ELB names (ELBs are referenced by name, not id).
    pub elb_names: Vec<String>,
    /// Resolved target group ARNs.
    pub target_group_arns: Vec<String>,
    /// Resolved subnet ids.
    pub subnet_ids: Vec<String>,
    /// Resolved IAM instance profile ARN.
    pub iam_profile_arn: String,
    /// Resolved AMI id.
    pub image_id: String,
}

/// A handle to a created or discovered scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalingGroupHandle {
    /// Provider-assigned scaling group name/id.
    pub id: String,
    /// The release id that created it (from its `ReleaseID` tag).
    pub release_id: String,
    /// The release uuid that created it (from its `ReleaseUUID` tag).
    pub release_uuid: String,
}

/// Specification for creating a launch template plus its scaling group.
#[derive(Debug, Clone)]
pub struct ScalingGroupSpec {
    /// Service id used as the launch template / scaling group name.
    pub service_id: String,
    /// Resolved AMI id.
    pub image_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Resolved IAM instance profile ARN.
    pub iam_profile_arn: String,
    /// Resolved security group ids.
    pub security_group_ids: Vec<String>,
    /// Resolved subnet ids.
    pub subnet_ids: Vec<String>,
    /// Whether instances get a public IP.
    pub associate_public_ip: bool,
    /// Rendered user-data, already token-substituted.
    pub user_data: String,
    /// Initial desired capacity (`strategy.initial_desired_capacity()`).
    pub desired_capacity: u32,
    /// Initial min size (`strategy.initial_min_size()`).
    pub min_size: u32,
    /// Max size.
    pub max_size: u32,
    /// Tags propagated to the group and its instances.
    pub tags: HashMap<String, String>,
}

/// The cloud operations the deploy machine drives. Implementations own
/// all provider-specific retry/pagination/rate-limit handling; the
/// machine's own retry budget (§4.1) only governs whether a *stage* is
/// attempted again, not individual provider calls.
#[async_trait]
pub trait CloudResources: Send + Sync {
    /// Resolves security group names to ids and tags.
    async fn resolve_security_groups(&self, names: &[String]) -> Result<Vec<ResolvedResource>>;
    /// Resolves classic ELB names (ELBs are addressed by name already, so
    /// this is primarily a tag/existence check).
    async fn resolve_elbs(&self, names: &[String]) -> Result<Vec<ResolvedResource>>;
    /// Resolves target group names to ARNs and tags.
    async fn resolve_target_groups(&self, names: &[String]) -> Result<Vec<ResolvedResource>>;
    /// Resolves subnet ids, checking their `DeployWith` tag.
    async fn resolve_subnets(&self, ids: &[String]) -> Result<Vec<ResolvedResource>>;
    /// Resolves the AMI, checking its `DeployWith` tag.
    async fn resolve_image(&self, image_id: &str) -> Result<ResolvedResource>;
    /// Resolves an IAM instance profile name to its ARN and path.
    async fn resolve_iam_profile(&self, profile_name: &str) -> Result<(String, String)>;

    /// Previous scaling groups owned by this project/config (used by
    /// `ValidateResources` and `Detach`).
    async fn previous_scaling_groups(
        &self,
        project_name: &str,
        config_name: &str,
    ) -> Result<Vec<ScalingGroupHandle>>;

    /// Creates a launch template and scaling group, unless one already
    /// exists tagged with this `release_uuid` (re-entry guard, §4.5).
    async fn create_scaling_group(
        &self,
        release_id: &str,
        release_uuid: &str,
        spec: &ScalingGroupSpec,
    ) -> Result<ScalingGroupHandle>;

    /// Attaches classic LBs and target groups to a scaling group.
    async fn attach_load_balancers(
        &self,
        group: &ScalingGroupHandle,
        elb_names: &[String],
        target_group_arns: &[String],
    ) -> Result<()>;

    /// Attaches lifecycle hooks to a scaling group.
    async fn attach_lifecycle_hooks(
        &self,
        group: &ScalingGroupHandle,
        hooks: &[LifeCycleHook],
    ) -> Result<()>;

    /// Creates one scaling policy and its paired metric alarm atomically.
    async fn create_policy_and_alarm(&self, group: &ScalingGroupHandle, policy: &Policy) -> Result<()>;

    /// Issues detach calls for every LB/target group attached to `group`.
    async fn detach_load_balancers(&self, group: &ScalingGroupHandle) -> Result<()>;

    /// Number of LBs/target groups still attached to `group`.
    async fn attached_load_balancer_count(&self, group: &ScalingGroupHandle) -> Result<usize>;

    /// Terminates a scaling group and its instances.
    async fn terminate_scaling_group(&self, group: &ScalingGroupHandle) -> Result<()>;

    /// Sets a scaling group's desired capacity (used by cleanup's
    /// capacity reset, which only ever touches desired capacity).
    async fn set_desired_capacity(&self, group: &ScalingGroupHandle, desired: u32) -> Result<()>;

    /// Sets a scaling group's min size and desired capacity together (used
    /// by `CheckHealthy`'s per-tick rollout ramp, which advances both in
    /// lockstep per `strategy.calculate_min_desired`).
    async fn set_min_desired(&self, group: &ScalingGroupHandle, min_size: u32, desired: u32) -> Result<()>;

    /// Reads merged instance health across the scaling group, its
    /// classic LBs and its target groups (§4.0, worst-wins merge).
    async fn instance_health(&self, group: &ScalingGroupHandle) -> Result<Instances>;
}

/// One tracked scaling group: `(handle, min_size, desired, attached_lb_count)`.
type TrackedGroup = (ScalingGroupHandle, u32, u32, usize);

/// An in-memory [`CloudResources`] fake for tests.
#[derive(Default)]
pub struct InMemoryCloudResources {
    groups: Mutex<HashMap<String, TrackedGroup>>,
    health: Mutex<HashMap<String, Instances>>,
}

impl InMemoryCloudResources {
    /// Seeds a previously-created scaling group, as if a prior deploy had
    /// run.
    pub fn seed_previous_group(&self, handle: ScalingGroupHandle, attached: usize) {
        self.groups
            .lock()
            .unwrap()
            .insert(handle.id.clone(), (handle, 0, 0, attached));
    }

    /// Returns the tracked `(min_size, desired)` for a group, if any.
    pub fn min_desired(&self, group_id: &str) -> Option<(u32, u32)> {
        self.groups.lock().unwrap().get(group_id).map(|(_, min, desired, _)| (*min, *desired))
    }

    /// Seeds the health state returned for a scaling group.
    pub fn seed_health(&self, group_id: &str, instances: Instances) {
        self.health.lock().unwrap().insert(group_id.to_string(), instances);
    }
}

fn resolved(names: &[String]) -> Vec<ResolvedResource> {
    names
        .iter()
        .map(|name| ResolvedResource {
            name: name.clone(),
            id: format!("{name}-id"),
            tags: OwnershipTags {
                project_name: "_all".to_string(),
                config_name: "_all".to_string(),
                service_name: None,
            },
        })
        .collect()
}

#[async_trait]
impl CloudResources for InMemoryCloudResources {
    async fn resolve_security_groups(&self, names: &[String]) -> Result<Vec<ResolvedResource>> {
        Ok(resolved(names))
    }

    async fn resolve_elbs(&self, names: &[String]) -> Result<Vec<ResolvedResource>> {
        Ok(resolved(names))
    }

    async fn resolve_target_groups(&self, names: &[String]) -> Result<Vec<ResolvedResource>> {
        Ok(resolved(names))
    }

    async fn resolve_subnets(&self, ids: &[String]) -> Result<Vec<ResolvedResource>> {
        Ok(resolved(ids))
    }

    async fn resolve_image(&self, image_id: &str) -> Result<ResolvedResource> {
        Ok(resolved(std::slice::from_ref(&image_id.to_string()))
            .pop()
            .unwrap())
    }

    async fn resolve_iam_profile(&self, profile_name: &str) -> Result<(String, String)> {
        Ok((
            format!("arn:aws:iam::000000000000:instance-profile/{profile_name}"),
            "/fleetops/_all/_all/_all/".to_string(),
        ))
    }

    async fn previous_scaling_groups(
        &self,
        _project_name: &str,
        _config_name: &str,
    ) -> Result<Vec<ScalingGroupHandle>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .values()
            .map(|(handle, _, _, _)| handle.clone())
            .collect())
    }

    async fn create_scaling_group(
        &self,
        release_id: &str,
        release_uuid: &str,
        spec: &ScalingGroupSpec,
    ) -> Result<ScalingGroupHandle> {
        let mut groups = self.groups.lock().unwrap();
        if let Some((existing, _, _, _)) = groups
            .values()
            .find(|(h, _, _, _)| h.release_uuid == release_uuid)
        {
            return Ok(existing.clone());
        }
        let handle = ScalingGroupHandle {
            id: spec.service_id.clone(),
            release_id: release_id.to_string(),
            release_uuid: release_uuid.to_string(),
        };
        groups.insert(
            handle.id.clone(),
            (handle.clone(), spec.min_size, spec.desired_capacity, 0),
        );
        Ok(handle)
    }

    async fn attach_load_balancers(
        &self,
        group: &ScalingGroupHandle,
        elb_names: &[String],
        target_group_arns: &[String],
    ) -> Result<()> {
        if let Some(entry) = self.groups.lock().unwrap().get_mut(&group.id) {
            entry.3 += elb_names.len() + target_group_arns.len();
        }
        Ok(())
    }

    async fn attach_lifecycle_hooks(
        &self,
        _group: &ScalingGroupHandle,
        _hooks: &[LifeCycleHook],
    ) -> Result<()> {
        Ok(())
    }

    async fn create_policy_and_alarm(&self, _group: &ScalingGroupHandle, _policy: &Policy) -> Result<()> {
        Ok(())
    }

    async fn detach_load_balancers(&self, group: &ScalingGroupHandle) -> Result<()> {
        if let Some(entry) = self.groups.lock().unwrap().get_mut(&group.id) {
            entry.3 = 0;
        }
        Ok(())
    }

    async fn attached_load_balancer_count(&self, group: &ScalingGroupHandle) -> Result<usize> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&group.id)
            .map_or(0, |(_, _, _, attached)| *attached))
    }

    async fn terminate_scaling_group(&self, group: &ScalingGroupHandle) -> Result<()> {
        self.groups.lock().unwrap().remove(&group.id);
        Ok(())
    }

    async fn set_desired_capacity(&self, group: &ScalingGroupHandle, desired: u32) -> Result<()> {
        if let Some(entry) = self.groups.lock().unwrap().get_mut(&group.id) {
            entry.2 = desired;
        }
        Ok(())
    }

    async fn set_min_desired(&self, group: &ScalingGroupHandle, min_size: u32, desired: u32) -> Result<()> {
        if let Some(entry) = self.groups.lock().unwrap().get_mut(&group.id) {
            entry.1 = min_size;
            entry.2 = desired;
        }
        Ok(())
    }

    async fn instance_health(&self, group: &ScalingGroupHandle) -> Result<Instances> {
        Ok(self
            .health
            .lock()
            .unwrap()
            .get(&group.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Checks that a name resolved to exactly one id, the §4.4 rule that
/// turns an ambiguous or missing reference into a validation failure.
///
/// # Errors
///
/// Returns [`CloudError::NotFound`] if zero ids resolved, or
/// [`CloudError::AmbiguousReference`] if more than one did.
pub fn require_single_match(name: &str, resolved: &[ResolvedResource]) -> Result<&ResolvedResource> {
    match resolved.len() {
        0 => Err(CloudError::NotFound { name: name.to_string() }),
        1 => Ok(&resolved[0]),
        found => Err(CloudError::AmbiguousReference {
            name: name.to_string(),
            found,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_match_is_ok() {
        let resources = vec![ResolvedResource {
            name: "sg-web".to_string(),
            id: "sg-123".to_string(),
            tags: OwnershipTags {
                project_name: "proj".to_string(),
                config_name: "conf".to_string(),
                service_name: None,
            },
        }];
        assert!(require_single_match("sg-web", &resources).is_ok());
    }

    #[test]
    fn zero_matches_is_not_found() {
        assert!(matches!(
            require_single_match("missing", &[]),
            Err(CloudError::NotFound { .. })
        ));
    }

    #[test]
    fn two_matches_is_ambiguous() {
        let dup = ResolvedResource {
            name: "sg-web".to_string(),
            id: "sg-123".to_string(),
            tags: OwnershipTags {
                project_name: "proj".to_string(),
                config_name: "conf".to_string(),
                service_name: None,
            },
        };
        let resources = vec![dup.clone(), dup];
        assert!(matches!(
            require_single_match("sg-web", &resources),
            Err(CloudError::AmbiguousReference { found: 2, .. })
        ));
    }

    #[tokio::test]
    async fn create_scaling_group_is_idempotent_per_uuid() {
        let cloud = InMemoryCloudResources::default();
        let spec = ScalingGroupSpec {
            service_id: "proj-conf-2026-01-01T00-00-00Z-web".to_string(),
            image_id: "ami-1".to_string(),
            instance_type: "m5.large".to_string(),
            iam_profile_arn: "arn:aws:iam::0:instance-profile/x".to_string(),
            security_group_ids: vec![],
            subnet_ids: vec![],
            associate_public_ip: false,
            user_data: String::new(),
            desired_capacity: 2,
            min_size: 1,
            max_size: 4,
            tags: HashMap::new(),
        };
        let first = cloud
            .create_scaling_group("r-1", "uuid-1", &spec)
            .await
            .unwrap();
        let second = cloud
            .create_scaling_group("r-1", "uuid-1", &spec)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn attach_then_detach_clears_count() {
        let cloud = InMemoryCloudResources::default();
        let spec = ScalingGroupSpec {
            service_id: "svc".to_string(),
            image_id: "ami-1".to_string(),
            instance_type: "m5.large".to_string(),
            iam_profile_arn: String::new(),
            security_group_ids: vec![],
            subnet_ids: vec![],
            associate_public_ip: false,
            user_data: String::new(),
            desired_capacity: 1,
            min_size: 1,
            max_size: 1,
            tags: HashMap::new(),
        };
        let group = cloud.create_scaling_group("r-1", "uuid-1", &spec).await.unwrap();
        cloud
            .attach_load_balancers(&group, &["elb-a".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(cloud.attached_load_balancer_count(&group).await.unwrap(), 1);
        cloud.detach_load_balancers(&group).await.unwrap();
        assert_eq!(cloud.attached_load_balancer_count(&group).await.unwrap(), 0);
    }
}
