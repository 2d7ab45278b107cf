//! Task handlers for each non-terminal [`crate::state::MachineState`].
//!
//! Each handler is a thin, mostly-sequential function over a
//! [`DeployContext`]: it mutates the release in place and talks to its
//! injected [`ObjectStore`]/[`CloudResources`] collaborators. Per-service
//! work inside `ValidateResources`, `Deploy` and `CheckHealthy` runs
//! concurrently, since services are independent (§5).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleetops_core::instances::Instances;
use fleetops_core::release::Release;
use fleetops_core::resources::ServiceResourceNames;
use fleetops_core::service::{DetachStrategy, HealthReport, Service};
use fleetops_core::Validate as _;
use fleetops_resources::cloud::{CloudResources, ResolvedResource, ScalingGroupHandle, ScalingGroupSpec};
use fleetops_resources::object_store::{ObjectStore, ObjectStoreError};
use fleetops_resources::iam_path_matches;
use futures::future::try_join_all;

use crate::config::MachineConfig;
use crate::error::{MachineError, Result};
use crate::lock;

/// The IAM/tag product prefix every owned resource is checked against.
const PRODUCT: &str = "fleetops";

/// Everything one deploy execution threads through its handlers.
pub struct DeployContext<'a> {
    /// The release being deployed, mutated in place as it progresses.
    pub release: Release,
    /// The scaling groups created by this execution, keyed by service
    /// name.
    pub created_groups: HashMap<String, ScalingGroupHandle>,
    /// Object store backing release/user-data/lock/halt.
    pub object_store: &'a dyn ObjectStore,
    /// Cloud resource collaborator.
    pub cloud: &'a dyn CloudResources,
    /// Machine-wide configuration.
    pub config: &'a MachineConfig,
}

impl DeployContext<'_> {
    fn userdata_key(&self) -> String {
        format!(
            "{}/{}/{}/userdata",
            self.release.project_name, self.release.config_name, self.release.release_id
        )
    }

    fn previous_release_key(&self) -> String {
        format!("{}/{}/previous/release.json", self.release.project_name, self.release.config_name)
    }
}

fn store_err(key: &str, err: ObjectStoreError) -> MachineError {
    MachineError::ObjectStoreError {
        key: key.to_string(),
        reason: err.reason,
    }
}

/// `Validate` (§4.2): stamp the release hash, apply defaults, run
/// structural validation, and verify user-data integrity.
pub async fn validate(ctx: &mut DeployContext<'_>) -> Result<()> {
    ctx.release.stamp_release_sha()?;
    let uuid = ctx.release.uuid.clone();
    ctx.release.apply_defaults(uuid);

    ctx.release
        .validate()
        .map_err(|errors| fleetops_core::Error::bad_release(errors.to_string()))?;

    if !ctx.release.user_data_sha256.is_empty() {
        let key = ctx.userdata_key();
        let bytes = ctx
            .object_store
            .get(&key)
            .await
            .map_err(|e| store_err(&key, e))?
            .ok_or_else(|| fleetops_core::Error::bad_release(format!("user-data object missing at {key}")))?;
        ctx.release.user_data = Some(String::from_utf8_lossy(&bytes).into_owned());
        ctx.release.validate_user_data_sha()?;
    }

    if ctx.release.safe_release {
        validate_safe_release(ctx).await?;
    }

    Ok(())
}

async fn validate_safe_release(ctx: &mut DeployContext<'_>) -> Result<()> {
    let previous_groups = ctx
        .cloud
        .previous_scaling_groups(&ctx.release.project_name, &ctx.release.config_name)
        .await
        .map_err(|e| fleetops_core::Error::bad_release(e.to_string()))?;

    let key = ctx.previous_release_key();
    let previous_bytes = ctx.object_store.get(&key).await.map_err(|e| store_err(&key, e))?;

    let previous = match previous_bytes {
        Some(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            Some(Release::from_json(&text)?)
        }
        None => None,
    };

    match previous {
        None if previous_groups.is_empty() => Ok(()),
        None => Err(fleetops_core::Error::bad_release(
            "previous scaling groups exist but no previous release document was found",
        )
        .into()),
        Some(previous) => {
            let diff = fleetops_core::safe_diff::diff(&ctx.release, &previous);
            if diff.is_empty() {
                Ok(())
            } else {
                Err(fleetops_core::Error::bad_release(diff.to_string()).into())
            }
        }
    }
}

/// `Lock` (§4.3): acquire the per-project/config mutex.
pub async fn acquire_lock(ctx: &DeployContext<'_>, now: DateTime<Utc>) -> Result<()> {
    lock::grab_lock(
        ctx.object_store,
        &ctx.release.project_name,
        &ctx.release.config_name,
        &ctx.release.uuid,
        now,
    )
    .await
}

/// `ReleaseLockFailure`: best-effort lock release on any failure path.
pub async fn release_lock_failure(ctx: &DeployContext<'_>) -> Result<()> {
    lock::release_lock(
        ctx.object_store,
        &ctx.release.project_name,
        &ctx.release.config_name,
        &ctx.release.uuid,
    )
    .await
}

fn check_ownership(
    resolved: std::result::Result<Vec<ResolvedResource>, fleetops_resources::cloud::CloudError>,
    project_name: &str,
    config_name: &str,
    service_name: &str,
) -> Result<Vec<ResolvedResource>> {
    let resolved = resolved.map_err(|e| fleetops_core::Error::bad_release(e.to_string()))?;
    for resource in &resolved {
        if !resource.tags.matches(project_name, config_name, service_name) {
            return Err(fleetops_core::Error::bad_release(format!(
                "resource '{}' is not owned by {project_name}/{config_name}",
                resource.name
            ))
            .into());
        }
    }
    Ok(resolved)
}

/// `ValidateResources` (§4.4): resolve every named reference to an id and
/// check tag ownership. Runs one resolution per service concurrently.
pub async fn validate_resources(ctx: &mut DeployContext<'_>) -> Result<()> {
    let project_name = ctx.release.project_name.clone();
    let config_name = ctx.release.config_name.clone();
    let subnets = ctx.release.subnets.clone();
    let image = ctx.release.image.clone();

    let subnet_ids: Vec<String> = check_ownership(
        ctx.cloud.resolve_subnets(&subnets).await,
        &project_name,
        &config_name,
        "",
    )?
    .into_iter()
    .map(|r| r.id)
    .collect();

    let resolved_image = ctx
        .cloud
        .resolve_image(&image)
        .await
        .map_err(|e| fleetops_core::Error::bad_release(e.to_string()))?;

    let service_names: Vec<String> = ctx.release.services.keys().cloned().collect();
    let resolutions = service_names.iter().map(|name| {
        resolve_service_resources(
            ctx.cloud,
            &project_name,
            &config_name,
            &resolved_image.id,
            &subnet_ids,
            ctx.release.services[name].clone(),
        )
    });
    let resolved = try_join_all(resolutions).await?;

    for (name, names) in service_names.into_iter().zip(resolved) {
        if let Some(service) = ctx.release.services.get_mut(&name) {
            service.resource_names = Some(names);
        }
    }

    // Slow-start window isn't surfaced by the collaborator trait; fall
    // back to the already-computed health-check polling tier.
    ctx.release.wait_for_detach = ctx.release.wait_for_healthy;

    Ok(())
}

async fn resolve_service_resources(
    cloud: &dyn CloudResources,
    project_name: &str,
    config_name: &str,
    image_id: &str,
    subnet_ids: &[String],
    service: Service,
) -> Result<ServiceResourceNames> {
    let security_groups = check_ownership(
        cloud.resolve_security_groups(&service.security_groups).await,
        project_name,
        config_name,
        &service.name,
    )?;
    let elbs = check_ownership(
        cloud.resolve_elbs(&service.elbs).await,
        project_name,
        config_name,
        &service.name,
    )?;
    let target_groups = check_ownership(
        cloud.resolve_target_groups(&service.target_groups).await,
        project_name,
        config_name,
        &service.name,
    )?;
    let (iam_arn, iam_path) = cloud
        .resolve_iam_profile(&service.profile)
        .await
        .map_err(|e| fleetops_core::Error::bad_release(e.to_string()))?;
    if !iam_path_matches(&iam_path, PRODUCT, project_name, config_name, &service.name) {
        return Err(fleetops_core::Error::bad_release(format!(
            "iam profile path '{iam_path}' does not match {project_name}/{config_name}/{}",
            service.name
        ))
        .into());
    }

    Ok(ServiceResourceNames {
        security_group_ids: security_groups.into_iter().map(|r| r.id).collect(),
        elb_names: elbs.into_iter().map(|r| r.name).collect(),
        target_group_arns: target_groups.into_iter().map(|r| r.id).collect(),
        subnet_ids: subnet_ids.to_vec(),
        iam_profile_arn: Some(iam_arn),
        image_id: Some(image_id.to_string()),
    })
}

/// Checks the halt condition (§4.8): timeout exceeded, or a live halt
/// object.
pub async fn check_halt(ctx: &DeployContext<'_>, now: DateTime<Utc>) -> Result<()> {
    if ctx.release.timed_out(now) {
        return Err(fleetops_core::Error::halt("release timeout exceeded").into());
    }
    if lock::is_halted(
        ctx.object_store,
        &ctx.release.project_name,
        &ctx.release.config_name,
        now,
    )
    .await?
    {
        return Err(fleetops_core::Error::halt("halt flag set").into());
    }
    Ok(())
}

/// `Deploy` (§4.5): re-check the halt condition, then create each
/// service's scaling group, attach its load balancers and lifecycle
/// hooks, and create its scaling policies. Per-service, concurrent.
pub async fn deploy(ctx: &mut DeployContext<'_>, now: DateTime<Utc>) -> Result<()> {
    check_halt(ctx, now).await?;

    let release_id = ctx.release.release_id.clone();
    let uuid = ctx.release.uuid.clone();
    let hooks: Vec<_> = ctx.release.lifecycle_hooks.values().cloned().collect();
    let user_data_template = ctx.release.user_data.clone().unwrap_or_default();

    let handles = try_join_all(ctx.release.services.values().cloned().map(|service| {
        deploy_service(
            ctx.cloud,
            &release_id,
            &uuid,
            service,
            hooks.clone(),
            user_data_template.clone(),
        )
    }))
    .await?;

    for (name, handle) in handles {
        if let Some(service) = ctx.release.services.get_mut(&name) {
            service.created_asg = Some(handle.id.clone());
        }
        ctx.created_groups.insert(name, handle);
    }
    Ok(())
}

async fn deploy_service(
    cloud: &dyn CloudResources,
    release_id: &str,
    uuid: &str,
    service: Service,
    hooks: Vec<fleetops_core::lifecycle::LifeCycleHook>,
    user_data_template: String,
) -> Result<(String, ScalingGroupHandle)> {
    let names = service
        .resource_names
        .clone()
        .ok_or_else(|| fleetops_core::Error::DeployError {
            service: service.name.clone(),
            reason: "resources were never resolved".to_string(),
        })?;
    let params = service.autoscaling.params();
    let strategy = service.autoscaling.strategy;

    let spec = ScalingGroupSpec {
        service_id: service.service_id(),
        image_id: names.image_id.clone().unwrap_or_default(),
        instance_type: service.instance_type.clone(),
        iam_profile_arn: names.iam_profile_arn.clone().unwrap_or_default(),
        security_group_ids: names.security_group_ids.clone(),
        subnet_ids: names.subnet_ids.clone(),
        associate_public_ip: service.associate_public_ip,
        user_data: service.render_user_data(&user_data_template),
        desired_capacity: strategy.initial_desired_capacity(&params),
        min_size: strategy.initial_min_size(&params),
        max_size: params.max_size,
        tags: service.tags.clone(),
    };

    let on_err = |e: fleetops_resources::cloud::CloudError| fleetops_core::Error::DeployError {
        service: service.name.clone(),
        reason: e.to_string(),
    };

    let handle = cloud
        .create_scaling_group(release_id, uuid, &spec)
        .await
        .map_err(on_err)?;

    cloud
        .attach_load_balancers(&handle, &names.elb_names, &names.target_group_arns)
        .await
        .map_err(on_err)?;

    cloud.attach_lifecycle_hooks(&handle, &hooks).await.map_err(on_err)?;

    for policy in &service.autoscaling.policies {
        cloud.create_policy_and_alarm(&handle, policy).await.map_err(on_err)?;
    }

    Ok((service.name.clone(), handle))
}

/// `CheckHealthy` (§4.9): merge instance health per service, update
/// `HealthReport`s, advance step-based strategies, and report whether the
/// whole release is healthy.
pub async fn check_healthy(ctx: &mut DeployContext<'_>) -> Result<bool> {
    let mut all_healthy = true;
    for (name, handle) in ctx.created_groups.clone() {
        let Some(service) = ctx.release.services.get(&name).cloned() else {
            continue;
        };
        let instances: Instances = ctx
            .cloud
            .instance_health(&handle)
            .await
            .map_err(|e| fleetops_core::Error::HealthError { reason: e.to_string() })?;

        let strategy = service.autoscaling.strategy;
        let params = service.autoscaling.params();

        if strategy.reached_max_terminations(&params, &instances) {
            return Err(fleetops_core::Error::halt(format!(
                "service '{name}' exceeded its termination budget"
            ))
            .into());
        }

        let (healthy, _unhealthy, terminating) = instances.healthy_unhealthy_terminating();
        #[allow(clippy::cast_possible_truncation)]
        let report = HealthReport {
            target_launched: params.target_capacity(),
            target_healthy: params.target_healthy(),
            healthy: healthy as u32,
            launching: (instances.len().saturating_sub(healthy + terminating)) as u32,
            terminating: terminating as u32,
        };

        let Some(service) = ctx.release.services.get_mut(&name) else {
            continue;
        };
        service.set_healthy(report);
        all_healthy &= service.healthy;

        if !service.healthy {
            let (min_size, desired) = strategy.calculate_min_desired(&params, &instances);
            ctx.cloud
                .set_min_desired(&handle, min_size, desired)
                .await
                .map_err(|e| fleetops_core::Error::HealthError { reason: e.to_string() })?;
        }
    }
    Ok(all_healthy)
}

/// `DetachForSuccess`/`DetachForFailure` (§4.9): issue detach calls for
/// the relevant scaling groups, honoring each service's
/// [`DetachStrategy`]. Returns the groups that should be polled for
/// convergence (`SkipDetachCheck` groups are excluded).
pub async fn detach(ctx: &DeployContext<'_>, for_success: bool) -> Result<Vec<ScalingGroupHandle>> {
    let candidates = groups_to_act_on(ctx, for_success).await?;
    let mut to_poll = Vec::new();
    for (handle, strategy) in candidates {
        if strategy == DetachStrategy::SkipDetach {
            continue;
        }
        ctx.cloud.detach_load_balancers(&handle).await.map_err(|e| {
            fleetops_core::Error::DetachError {
                group: format!("{}: {e}", handle.id),
            }
        })?;
        if strategy != DetachStrategy::SkipDetachCheck {
            to_poll.push(handle);
        }
    }
    Ok(to_poll)
}

async fn groups_to_act_on(
    ctx: &DeployContext<'_>,
    for_success: bool,
) -> Result<Vec<(ScalingGroupHandle, DetachStrategy)>> {
    if for_success {
        let previous = ctx
            .cloud
            .previous_scaling_groups(&ctx.release.project_name, &ctx.release.config_name)
            .await
            .map_err(|e| fleetops_core::Error::DetachError {
                group: format!("previous: {e}"),
            })?;
        let current_release_id = ctx.release.release_id.clone();
        Ok(previous
            .into_iter()
            .filter(|g| g.release_id != current_release_id)
            .map(|g| (g, DetachStrategy::Detach))
            .collect())
    } else {
        Ok(ctx
            .created_groups
            .iter()
            .map(|(name, handle)| {
                let strategy = ctx
                    .release
                    .services
                    .get(name)
                    .map_or(DetachStrategy::Detach, |s| s.detach_strategy);
                (handle.clone(), strategy)
            })
            .collect())
    }
}

/// `WaitDetachForSuccess`/`WaitDetachForFailure`: polls until every group
/// in `groups` reports zero attached load balancers.
pub async fn detach_converged(ctx: &DeployContext<'_>, groups: &[ScalingGroupHandle]) -> Result<bool> {
    for handle in groups {
        let count = ctx.cloud.attached_load_balancer_count(handle).await.map_err(|e| {
            fleetops_core::Error::DetachError {
                group: format!("{}: {e}", handle.id),
            }
        })?;
        if count > 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `CleanUpSuccess`/`CleanUpFailure` (§4.9): tear down the selected
/// scaling groups (alarms, group, launch template — modelled here as one
/// `terminate_scaling_group` call per group) and, on success, reset the
/// new group's capacity back to `strategy.desired_capacity()` and clear
/// any halt flag.
pub async fn clean_up(ctx: &mut DeployContext<'_>, groups: &[ScalingGroupHandle], for_success: bool) -> Result<()> {
    for handle in groups {
        ctx.cloud
            .terminate_scaling_group(handle)
            .await
            .map_err(|e| fleetops_core::Error::CleanUpError { reason: e.to_string() })?;
    }

    if for_success {
        lock::release_lock(
            ctx.object_store,
            &ctx.release.project_name,
            &ctx.release.config_name,
            &ctx.release.uuid,
        )
        .await?;

        for (name, handle) in ctx.created_groups.clone() {
            let Some(service) = ctx.release.services.get(&name) else {
                continue;
            };
            let params = service.autoscaling.params();
            let desired = params.desired_capacity();
            if let Err(e) = ctx.cloud.set_desired_capacity(&handle, desired).await {
                tracing::warn!(service = %name, error = %e, "capacity reset after cleanup failed, ignoring");
            }
        }
        lock::remove_halt(ctx.object_store, &ctx.release.project_name, &ctx.release.config_name)
            .await
            .ok();
    }

    Ok(())
}
