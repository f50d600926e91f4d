//! Access policy documents
//!
//! A repository may commit a JSON document declaring the extra AWS
//! permissions its builds need:
//!
//! ```json
//! {
//!   "common": {
//!     "resources": [
//!       { "arns": ["arn:aws:s3:::widgets-assets/*"], "actions": ["s3:GetObject"] }
//!     ]
//!   }
//! }
//! ```
//!
//! Unknown top-level keys are ignored.

use serde::{Deserialize, Serialize};

/// A grant of actions over a set of resource patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionResource {
    /// Resource ARN patterns
    pub arns: Vec<String>,

    /// Permission actions, e.g. `s3:GetObject`
    pub actions: Vec<String>,

    /// Any further keys on the entry, forwarded verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PermissionResource {
    pub fn new<A, B>(arns: A, actions: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            arns: arns.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Project-supplied permission declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicyDocument {
    pub common: CommonSection,
}

/// The `common` section of an access document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSection {
    pub resources: Vec<PermissionResource>,
}

impl AccessPolicyDocument {
    pub fn new(resources: Vec<PermissionResource>) -> Self {
        Self {
            common: CommonSection { resources },
        }
    }

    pub fn resources(&self) -> &[PermissionResource] {
        &self.common.resources
    }
}
