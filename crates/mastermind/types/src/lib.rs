//! Mastermind Types - Shared data model for build access provisioning
//!
//! Each Buildkite job runs in a sandboxed container. Before the container
//! starts, the agent hook asks Mastermind for a role scoped to the pipeline
//! and installs short-lived credentials for it into the job's environment.
//!
//! ## Key Concepts
//!
//! - **BuildEnvironment**: Variables handed to the job container (read-only input)
//! - **EnvPatch**: Variables to set and remove, produced by provisioning
//! - **AccessPolicyDocument**: Project-supplied extra permissions
//! - **RoleRequest**: Payload submitted to the approval service
//! - **Credentials**: Short-lived keys issued for an approved role

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod credentials;
pub mod env;
pub mod policy;
pub mod request;
pub mod vars;

// Re-export main types
pub use credentials::{Credentials, RoleGrant};
pub use env::{BuildEnvironment, EnvPatch, MissingVariable};
pub use policy::{AccessPolicyDocument, CommonSection, PermissionResource};
pub use request::{Permissions, Principal, ProjectIdentifier, RoleRequest, BUILD_ENVIRONMENT_TAG};
