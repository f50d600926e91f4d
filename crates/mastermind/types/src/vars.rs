//! Well-known environment variable names
//!
//! Build variables are read from the job's [`BuildEnvironment`](crate::BuildEnvironment);
//! agent variables come from the hook process itself.

// ========== Build variables ==========

pub const PIPELINE_SLUG: &str = "BUILDKITE_PIPELINE_SLUG";
pub const JOB_ID: &str = "BUILDKITE_JOB_ID";
pub const REPO: &str = "BUILDKITE_REPO";
pub const COMMIT: &str = "BUILDKITE_COMMIT";
pub const ARTIFACT_UPLOAD_DESTINATION: &str = "BUILDKITE_ARTIFACT_UPLOAD_DESTINATION";
pub const ENV_FILE: &str = "BUILDKITE_ENV_FILE";

/// Overrides the repository-relative location of the access document.
pub const ACCESS_DOCUMENT_PATH: &str = "MASTERMIND_ACCESS_DOCUMENT_PATH";

/// Default repository-relative location of the access document.
pub const DEFAULT_ACCESS_DOCUMENT_PATH: &str = ".buildkite/aws_access.json";

// ========== Agent variables ==========

pub const USE_MASTERMIND: &str = "BUILDKITE_USE_MASTERMIND";
pub const AGENT_DEBUG: &str = "BUILDKITE_AGENT_DEBUG";

// ========== Produced variables ==========

pub const MASTERMIND_ACCESS_KEY_ID: &str = "MASTERMIND_ACCESS_KEY_ID";
pub const MASTERMIND_SECRET_ACCESS_KEY: &str = "MASTERMIND_SECRET_ACCESS_KEY";
pub const MASTERMIND_SESSION_TOKEN: &str = "MASTERMIND_SESSION_TOKEN";
pub const MASTERMIND_AWS_CONFIG_FILE_URL: &str = "MASTERMIND_AWS_CONFIG_FILE_URL";

/// Ambient AWS credential variables.
///
/// Copied through to the job when Mastermind is disabled, removed from it
/// once Mastermind credentials are installed.
pub const AMBIENT_AWS_CREDENTIALS: [&str; 4] = [
    "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];
