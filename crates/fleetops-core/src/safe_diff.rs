//! The safe-release diff (§4.6): compares a new release against the
//! previously deployed one and reports every differing field, rather than
//! failing on the first mismatch.

use std::collections::HashSet;

use crate::release::Release;
use crate::validation::{ValidationError, ValidationErrors};

/// Compares `new_release` against `previous`, accumulating every mismatch
/// on the fixed field set named in §4.6, and returns them all rather than
/// stopping at the first (§8 property 5, §9 "Per-field diff").
#[must_use]
pub fn diff(new_release: &Release, previous: &Release) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    diff_set(
        &mut errors,
        "subnets",
        &new_release.subnets,
        &previous.subnets,
    );
    if new_release.image != previous.image {
        errors.add(ValidationError::constraint(
            "image",
            format!(
                "changed from '{}' to '{}'",
                previous.image, new_release.image
            ),
        ));
    }
    if new_release.timeout_seconds != previous.timeout_seconds {
        errors.add(ValidationError::constraint(
            "timeout_seconds",
            format!(
                "changed from {} to {}",
                previous.timeout_seconds, new_release.timeout_seconds
            ),
        ));
    }

    let new_names: HashSet<&String> = new_release.services.keys().collect();
    let previous_names: HashSet<&String> = previous.services.keys().collect();
    if new_names != previous_names {
        errors.add(ValidationError::constraint(
            "services",
            "service name set changed between releases",
        ));
    }

    for (name, new_service) in &new_release.services {
        let Some(previous_service) = previous.services.get(name) else {
            continue;
        };
        diff_set(
            &mut errors,
            &format!("services.{name}.security_groups"),
            &new_service.security_groups,
            &previous_service.security_groups,
        );
        if new_service.profile != previous_service.profile {
            errors.add(ValidationError::constraint(
                format!("services.{name}.profile"),
                format!(
                    "changed from '{}' to '{}'",
                    previous_service.profile, new_service.profile
                ),
            ));
        }
        diff_set(
            &mut errors,
            &format!("services.{name}.elbs"),
            &new_service.elbs,
            &previous_service.elbs,
        );
        diff_set(
            &mut errors,
            &format!("services.{name}.target_groups"),
            &new_service.target_groups,
            &previous_service.target_groups,
        );

        let new_ebs = new_service.ebs_volume.as_ref();
        let previous_ebs = previous_service.ebs_volume.as_ref();
        if new_ebs.map(|v| v.size) != previous_ebs.map(|v| v.size) {
            errors.add(ValidationError::constraint(
                format!("services.{name}.ebs_volume.size"),
                "ebs volume size changed",
            ));
        }
        if new_ebs.map(|v| &v.volume_type) != previous_ebs.map(|v| &v.volume_type) {
            errors.add(ValidationError::constraint(
                format!("services.{name}.ebs_volume.type"),
                "ebs volume type changed",
            ));
        }
        if new_ebs.map(|v| &v.device_name) != previous_ebs.map(|v| &v.device_name) {
            errors.add(ValidationError::constraint(
                format!("services.{name}.ebs_volume.device_name"),
                "ebs volume device name changed",
            ));
        }

        if new_service.associate_public_ip != previous_service.associate_public_ip {
            errors.add(ValidationError::constraint(
                format!("services.{name}.associate_public_ip"),
                "changed",
            ));
        }
        if new_service.instance_type != previous_service.instance_type {
            errors.add(ValidationError::constraint(
                format!("services.{name}.instance_type"),
                format!(
                    "changed from '{}' to '{}'",
                    previous_service.instance_type, new_service.instance_type
                ),
            ));
        }

        let new_as = &new_service.autoscaling;
        let previous_as = &previous_service.autoscaling;
        diff_field(
            &mut errors,
            &format!("services.{name}.autoscaling.min_size"),
            new_as.min_size,
            previous_as.min_size,
        );
        diff_field(
            &mut errors,
            &format!("services.{name}.autoscaling.max_size"),
            new_as.max_size,
            previous_as.max_size,
        );
        diff_field(
            &mut errors,
            &format!("services.{name}.autoscaling.max_terminations"),
            new_as.max_terminations,
            previous_as.max_terminations,
        );
        diff_field(
            &mut errors,
            &format!("services.{name}.autoscaling.default_cooldown"),
            new_as.default_cooldown,
            previous_as.default_cooldown,
        );
        diff_field(
            &mut errors,
            &format!("services.{name}.autoscaling.health_check_grace_period"),
            new_as.health_check_grace_period,
            previous_as.health_check_grace_period,
        );
        if (new_as.spread - previous_as.spread).abs() > f64::EPSILON {
            errors.add(ValidationError::constraint(
                format!("services.{name}.autoscaling.spread"),
                format!("changed from {} to {}", previous_as.spread, new_as.spread),
            ));
        }
    }

    errors
}

fn diff_set(errors: &mut ValidationErrors, field: &str, new: &[String], previous: &[String]) {
    let new_set: HashSet<&String> = new.iter().collect();
    let previous_set: HashSet<&String> = previous.iter().collect();
    if new_set != previous_set {
        errors.add(ValidationError::constraint(field, "set changed between releases"));
    }
}

fn diff_field<T: PartialEq + std::fmt::Display>(
    errors: &mut ValidationErrors,
    field: &str,
    new: T,
    previous: T,
) {
    if new != previous {
        errors.add(ValidationError::constraint(
            field,
            format!("changed from {previous} to {new}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AutoscalingConfig, DetachStrategy, Service};
    use crate::strategy::RolloutStrategy;
    use chrono::Utc;
    use std::collections::HashMap;

    fn service(name: &str) -> Service {
        Service {
            name: name.to_string(),
            instance_type: "m5.large".to_string(),
            profile: "profile-a".to_string(),
            security_groups: vec!["sg-1".to_string()],
            elbs: vec![],
            target_groups: vec![],
            tags: HashMap::new(),
            ebs_volume: None,
            associate_public_ip: false,
            autoscaling: AutoscalingConfig {
                min_size: 1,
                max_size: 2,
                max_terminations: 1,
                spread: 0.1,
                default_cooldown: 300,
                health_check_grace_period: 300,
                policies: vec![],
                strategy: RolloutStrategy::AllAtOnce,
                previous_desired_capacity: None,
            },
            detach_strategy: DetachStrategy::Detach,
            created_asg: None,
            resource_names: None,
            health_report: None,
            healthy: false,
            owner: None,
        }
    }

    fn release(services: HashMap<String, Service>) -> Release {
        Release {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            release_id: "r-1".to_string(),
            uuid: String::new(),
            account_id: "1".to_string(),
            region: "us-east-1".to_string(),
            bucket: "bucket".to_string(),
            created_at: Utc::now(),
            timeout_seconds: 1800,
            image: "ami-1".to_string(),
            subnets: vec!["subnet-1".to_string()],
            lifecycle_hooks: HashMap::new(),
            services,
            user_data: None,
            user_data_sha256: String::new(),
            release_sha256: String::new(),
            safe_release: true,
            wait_for_healthy: 0,
            wait_for_detach: 0,
            healthy: false,
            success: false,
            error: None,
        }
    }

    #[test]
    fn identical_releases_have_no_diff() {
        let mut services = HashMap::new();
        services.insert("web".to_string(), service("web"));
        let previous = release(services.clone());
        let new_release = release(services);
        assert!(diff(&new_release, &previous).is_empty());
    }

    #[test]
    fn reports_all_differing_fields_not_just_the_first() {
        let mut services = HashMap::new();
        services.insert("web".to_string(), service("web"));
        let previous = release(services.clone());

        let mut new_services = services;
        let web = new_services.get_mut("web").unwrap();
        web.instance_type = "m5.xlarge".to_string();
        web.profile = "profile-b".to_string();
        web.autoscaling.min_size = 5;
        let new_release = release(new_services);

        let errors = diff(&new_release, &previous);
        assert_eq!(errors.len(), 3);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.iter().any(|f| f.contains("instance_type")));
        assert!(fields.iter().any(|f| f.contains("profile")));
        assert!(fields.iter().any(|f| f.contains("min_size")));
    }

    #[test]
    fn service_name_set_change_is_reported() {
        let mut services = HashMap::new();
        services.insert("web".to_string(), service("web"));
        let previous = release(services);

        let mut new_services = HashMap::new();
        new_services.insert("worker".to_string(), service("worker"));
        let new_release = release(new_services);

        let errors = diff(&new_release, &previous);
        assert!(errors.iter().any(|e| e.field == "services"));
    }
}
