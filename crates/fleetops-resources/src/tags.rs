//! Pure resource-ownership rules (§4.4): wildcard tag matching and IAM
//! profile path matching. No cloud calls; these are checked against
//! whatever tags/paths a [`crate::cloud::CloudResources`] implementation
//! returns.

/// The wildcard tag value that grants access across a project/config
/// boundary (a shared security group, for instance).
pub const ALL_VALUE: &str = "_all";

/// Whether a tag value is the `_all` wildcard.
#[must_use]
pub fn is_all_value(value: &str) -> bool {
    value == ALL_VALUE
}

/// The `ProjectName`/`ConfigName`/`ServiceName` ownership triple carried on
/// a cloud resource's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTags {
    /// `ProjectName` tag value.
    pub project_name: String,
    /// `ConfigName` tag value.
    pub config_name: String,
    /// `ServiceName` tag value, if the resource is service-scoped.
    pub service_name: Option<String>,
}

impl OwnershipTags {
    /// Whether these tags authorize use by `project_name`/`config_name`/
    /// `service_name`, honoring `_all` wildcards in any of the three
    /// positions.
    #[must_use]
    pub fn matches(&self, project_name: &str, config_name: &str, service_name: &str) -> bool {
        let project_ok = is_all_value(&self.project_name) || self.project_name == project_name;
        let config_ok = is_all_value(&self.config_name) || self.config_name == config_name;
        let service_ok = match &self.service_name {
            None => true,
            Some(tag) => is_all_value(tag) || tag == service_name,
        };
        project_ok && config_ok && service_ok
    }

    /// Whether this resource additionally carries `AllowedService` granting
    /// cross-ownership access to `project::config::service` — the one
    /// extra grant target groups may carry.
    #[must_use]
    pub fn allowed_service_matches(
        allowed_service_tag: Option<&str>,
        project_name: &str,
        config_name: &str,
        service_name: &str,
    ) -> bool {
        allowed_service_tag
            .map(|tag| tag == format!("{project_name}::{config_name}::{service_name}"))
            .unwrap_or(false)
    }
}

/// Whether a previous scaling group's tags make it eligible for detach:
/// owned by this project/config but **not** created by the current
/// release. An equal `release_id` here is a bug in the caller and must
/// abort rather than silently skip.
///
/// # Panics
///
/// Panics if `previous_release_id == current_release_id`; a previous
/// scaling group can never legitimately carry the release id that is
/// currently being deployed.
#[must_use]
pub fn is_eligible_for_detach(
    tags: &OwnershipTags,
    project_name: &str,
    config_name: &str,
    previous_release_id: &str,
    current_release_id: &str,
) -> bool {
    if !(tags.project_name == project_name || is_all_value(&tags.project_name))
        || !(tags.config_name == config_name || is_all_value(&tags.config_name))
    {
        return false;
    }
    assert!(
        previous_release_id != current_release_id,
        "a previous scaling group must never carry the current release_id"
    );
    true
}

/// Checks an IAM profile path against `/<product>/<project>/<config>/<service>/`,
/// allowing `_all` to substitute for `project`, `config` or `service` from
/// the right (i.e. a path may wildcard its trailing segments but not its
/// product prefix).
#[must_use]
pub fn iam_path_matches(
    path: &str,
    product: &str,
    project_name: &str,
    config_name: &str,
    service_name: &str,
) -> bool {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.len() != 4 || segments[0] != product {
        return false;
    }
    let expected = [project_name, config_name, service_name];
    segments[1..]
        .iter()
        .zip(expected)
        .all(|(segment, wanted)| *segment == wanted || is_all_value(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_allowed() {
        let tags = OwnershipTags {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            service_name: Some("web".to_string()),
        };
        assert!(tags.matches("proj", "conf", "web"));
        assert!(!tags.matches("other", "conf", "web"));
    }

    #[test]
    fn all_wildcard_in_project_position_is_allowed() {
        let tags = OwnershipTags {
            project_name: "_all".to_string(),
            config_name: "conf".to_string(),
            service_name: None,
        };
        assert!(tags.matches("anything", "conf", "web"));
        assert!(!tags.matches("anything", "other-conf", "web"));
    }

    #[test]
    fn allowed_service_grants_cross_ownership_access() {
        assert!(OwnershipTags::allowed_service_matches(
            Some("proj::conf::web"),
            "proj",
            "conf",
            "web"
        ));
        assert!(!OwnershipTags::allowed_service_matches(
            Some("proj::conf::other"),
            "proj",
            "conf",
            "web"
        ));
        assert!(!OwnershipTags::allowed_service_matches(None, "proj", "conf", "web"));
    }

    #[test]
    fn previous_group_with_different_release_id_is_eligible() {
        let tags = OwnershipTags {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            service_name: None,
        };
        assert!(is_eligible_for_detach(&tags, "proj", "conf", "r-old", "r-new"));
    }

    #[test]
    #[should_panic(expected = "current release_id")]
    fn previous_group_with_matching_release_id_panics() {
        let tags = OwnershipTags {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            service_name: None,
        };
        is_eligible_for_detach(&tags, "proj", "conf", "r-1", "r-1");
    }

    #[test]
    fn iam_path_exact_match() {
        assert!(iam_path_matches(
            "/fleetops/proj/conf/web/",
            "fleetops",
            "proj",
            "conf",
            "web"
        ));
    }

    #[test]
    fn iam_path_wildcards_trailing_segments() {
        assert!(iam_path_matches(
            "/fleetops/proj/_all/_all/",
            "fleetops",
            "proj",
            "conf",
            "web"
        ));
    }

    #[test]
    fn iam_path_rejects_wrong_product() {
        assert!(!iam_path_matches(
            "/other/proj/conf/web/",
            "fleetops",
            "proj",
            "conf",
            "web"
        ));
    }

    #[test]
    fn iam_path_rejects_wrong_segment_count() {
        assert!(!iam_path_matches("/fleetops/proj/conf/", "fleetops", "proj", "conf", "web"));
    }
}
