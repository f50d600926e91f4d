//! Role requests submitted to Mastermind

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::PermissionResource;

/// Environment tag attached to every request made from a build
pub const BUILD_ENVIRONMENT_TAG: &str = "build";

/// Identifies the project a role is requested for, `buildkite:<pipeline>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectIdentifier(String);

impl ProjectIdentifier {
    pub fn for_pipeline(pipeline_slug: &str) -> Self {
        Self(format!("buildkite:{}", pipeline_slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity that will assume the granted role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Principal {
    /// An AWS principal identified by ARN
    pub fn aws(arn: impl Into<String>) -> Self {
        Self {
            kind: "AWS".to_string(),
            value: arn.into(),
        }
    }
}

/// Requested permission set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    pub resources: Vec<PermissionResource>,
}

/// Access request payload, `POST <endpoint>/role`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRequest {
    pub project_identifier: ProjectIdentifier,
    pub environment: String,
    pub principal: Principal,
    pub permissions: Permissions,
}

impl RoleRequest {
    pub fn resources(&self) -> &[PermissionResource] {
        &self.permissions.resources
    }
}
