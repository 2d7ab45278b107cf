//! Resolved and named cloud resources attached to a service.
//!
//! Two parallel records exist per service: [`ServiceResources`] holds the
//! in-memory resolved identifiers produced by resource validation (§4.4, not
//! itself implemented in this crate — see the collaborator traits in
//! `fleetops-resources`), and [`ServiceResourceNames`] holds just the
//! wire-serialisable IDs/ARNs that get written back into the release
//! document.

use serde::{Deserialize, Serialize};

/// Resolved cloud object identifiers for a service, produced by resource
/// validation and consumed by the deploy stage. Never serialized directly;
/// [`ServiceResourceNames`] is the persisted projection of this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceResources {
    /// Resolved security group ids.
    pub security_group_ids: Vec<String>,
    /// Resolved classic load balancer names.
    pub elb_names: Vec<String>,
    /// Resolved target group ARNs.
    pub target_group_arns: Vec<String>,
    /// Resolved subnet ids.
    pub subnet_ids: Vec<String>,
    /// Resolved IAM instance profile ARN.
    pub iam_profile_arn: Option<String>,
    /// Resolved AMI id.
    pub image_id: Option<String>,
}

impl ServiceResources {
    /// Projects the resolved resources into their wire-serialisable ID-only
    /// form.
    #[must_use]
    pub fn to_names(&self) -> ServiceResourceNames {
        ServiceResourceNames {
            security_group_ids: self.security_group_ids.clone(),
            elb_names: self.elb_names.clone(),
            target_group_arns: self.target_group_arns.clone(),
            subnet_ids: self.subnet_ids.clone(),
            iam_profile_arn: self.iam_profile_arn.clone(),
            image_id: self.image_id.clone(),
        }
    }
}

/// The persisted, wire-serialisable projection of [`ServiceResources`]:
/// just the resolved IDs/ARNs, written back into the release document so a
/// re-read of the release reflects what was actually deployed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResourceNames {
    /// Resolved security group ids.
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    /// Resolved classic load balancer names.
    #[serde(default)]
    pub elb_names: Vec<String>,
    /// Resolved target group ARNs.
    #[serde(default)]
    pub target_group_arns: Vec<String>,
    /// Resolved subnet ids.
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    /// Resolved IAM instance profile ARN.
    #[serde(default)]
    pub iam_profile_arn: Option<String>,
    /// Resolved AMI id.
    #[serde(default)]
    pub image_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_names_copies_resolved_fields() {
        let resources = ServiceResources {
            security_group_ids: vec!["sg-1".to_string()],
            elb_names: vec!["elb-1".to_string()],
            target_group_arns: vec![],
            subnet_ids: vec!["subnet-1".to_string()],
            iam_profile_arn: Some("arn:aws:iam::1:instance-profile/p".to_string()),
            image_id: Some("ami-1".to_string()),
        };
        let names = resources.to_names();
        assert_eq!(names.security_group_ids, vec!["sg-1".to_string()]);
        assert_eq!(names.image_id, Some("ami-1".to_string()));
    }
}
