//! Configuration for mastermind-access
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML
//! file, then the agent environment (`MASTERMIND_*`, `AWS_REGION`,
//! `AWS_ACCOUNT_ID`, `BUILDKITE_USE_MASTERMIND`).

use mastermind_types::vars;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::error::{AccessError, AccessResult};
use crate::retry::{Backoff, RetryPolicy};

/// Mastermind API key, never printed
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Access provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Provision through Mastermind instead of passing agent credentials through
    #[serde(default)]
    pub enabled: bool,

    /// Mastermind base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Basic-auth user for Mastermind
    #[serde(default = "default_api_user")]
    pub api_user: String,

    /// Basic-auth password for Mastermind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,

    /// Bucket holding the per-project AWS config files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs_bucket: Option<String>,

    /// Principal to request the role for, instead of the agent's caller identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_account_id: Option<String>,

    /// Scratch bucket every build may read and write
    #[serde(default = "default_scratch_bucket")]
    pub scratch_bucket: String,

    /// Build-number allocator every build may invoke
    #[serde(default = "default_build_numbers_function")]
    pub build_numbers_function_arn: String,

    /// Extra clone host to raw-content host mappings
    #[serde(default)]
    pub raw_hosts: Vec<RawHostMapping>,

    /// Fail the build when the access document cannot be retrieved
    #[serde(default)]
    pub strict_policy_fetch: bool,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_user: default_api_user(),
            api_key: None,
            configs_bucket: None,
            task_role_arn: None,
            aws_region: None,
            aws_account_id: None,
            scratch_bucket: default_scratch_bucket(),
            build_numbers_function_arn: default_build_numbers_function(),
            raw_hosts: Vec::new(),
            strict_policy_fetch: false,
            request_timeout_secs: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Maps a source-control host to the host serving raw file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHostMapping {
    pub clone_host: String,
    pub raw_host: String,
}

/// Retry budgets for each stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_fetch_attempts")]
    pub fetch_max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub fetch_base_delay_ms: u64,

    #[serde(default = "default_approval_deadline")]
    pub approval_deadline_secs: u64,

    #[serde(default = "default_pending_min")]
    pub pending_min_delay_ms: u64,

    #[serde(default = "default_pending_max")]
    pub pending_max_delay_ms: u64,

    #[serde(default = "default_approval_attempts")]
    pub approval_max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub approval_base_delay_ms: u64,

    #[serde(default = "default_exchange_deadline")]
    pub exchange_deadline_secs: u64,

    #[serde(default = "default_base_delay")]
    pub exchange_base_delay_ms: u64,

    /// Cap on any single exponential delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fetch_max_attempts: default_fetch_attempts(),
            fetch_base_delay_ms: default_base_delay(),
            approval_deadline_secs: default_approval_deadline(),
            pending_min_delay_ms: default_pending_min(),
            pending_max_delay_ms: default_pending_max(),
            approval_max_attempts: default_approval_attempts(),
            approval_base_delay_ms: default_base_delay(),
            exchange_deadline_secs: default_exchange_deadline(),
            exchange_base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    fn exponential(&self, multiplier_ms: u64) -> Backoff {
        Backoff::Exponential {
            multiplier: Duration::from_millis(multiplier_ms),
            max: Duration::from_millis(self.max_delay_ms),
        }
    }

    /// Access document retrieval
    pub fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::attempts(
            self.fetch_max_attempts,
            self.exponential(self.fetch_base_delay_ms),
        )
    }

    /// Resubmission while Mastermind answers "pending"
    pub fn pending_policy(&self) -> RetryPolicy {
        RetryPolicy::deadline(
            Duration::from_secs(self.approval_deadline_secs),
            Backoff::Randomized {
                min: Duration::from_millis(self.pending_min_delay_ms),
                max: Duration::from_millis(self.pending_max_delay_ms),
            },
        )
    }

    /// Server errors from a single role submission
    pub fn approval_policy(&self) -> RetryPolicy {
        RetryPolicy::attempts(
            self.approval_max_attempts,
            self.exponential(self.approval_base_delay_ms),
        )
    }

    /// Role assumption
    pub fn exchange_policy(&self) -> RetryPolicy {
        RetryPolicy::deadline(
            Duration::from_secs(self.exchange_deadline_secs),
            self.exponential(self.exchange_base_delay_ms),
        )
    }
}

/// Built-in clone host to raw-content host table
pub const DEFAULT_RAW_HOSTS: [(&str, &str); 2] = [
    ("github.com", "raw.github.com"),
    ("www.github.com", "raw.github.com"),
];

// Default value helpers
fn default_api_user() -> String {
    "buildkite".to_string()
}

fn default_scratch_bucket() -> String {
    "tc-build-scratch".to_string()
}

fn default_build_numbers_function() -> String {
    "arn:aws:lambda:us-west-2:221344006312:function:build-numbers".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fetch_attempts() -> u32 {
    4
}

fn default_base_delay() -> u64 {
    1000
}

fn default_approval_deadline() -> u64 {
    600
}

fn default_pending_min() -> u64 {
    1000
}

fn default_pending_max() -> u64 {
    5000
}

fn default_approval_attempts() -> u32 {
    4
}

fn default_exchange_deadline() -> u64 {
    60
}

fn default_max_delay() -> u64 {
    30_000
}

impl AccessConfig {
    /// Load configuration from an optional file and the process environment
    pub fn load(path: Option<&str>) -> AccessResult<Self> {
        Self::load_from(path, std::env::vars().collect())
    }

    /// Load configuration from an optional file and the given variables
    pub fn load_from(path: Option<&str>, env: HashMap<String, String>) -> AccessResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&AccessConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // MASTERMIND_ENDPOINT -> endpoint, MASTERMIND_API_KEY -> api_key, ...
        builder = builder.add_source(
            config::Environment::with_prefix("MASTERMIND")
                .prefix_separator("_")
                .source(Some(env.clone())),
        );

        // AWS_REGION -> aws_region, AWS_ACCOUNT_ID -> aws_account_id
        builder = builder.add_source(
            config::Environment::with_prefix("AWS")
                .prefix_separator("_")
                .keep_prefix(true)
                .source(Some(env.clone())),
        );

        builder = builder.set_override_option(
            "enabled",
            env.get(vars::USE_MASTERMIND).map(|v| v == "true"),
        )?;

        builder.build()?.try_deserialize().map_err(AccessError::from)
    }

    /// Check that everything the Mastermind path needs is present
    pub fn validate(&self) -> AccessResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.endpoint.is_none() {
            missing.push("MASTERMIND_ENDPOINT");
        }
        if self.api_key.is_none() {
            missing.push("MASTERMIND_API_KEY");
        }
        if self.configs_bucket.is_none() {
            missing.push("MASTERMIND_CONFIGS_BUCKET");
        }
        if self.aws_region.is_none() {
            missing.push("AWS_REGION");
        }
        if self.aws_account_id.is_none() {
            missing.push("AWS_ACCOUNT_ID");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AccessError::Config(format!(
                "Mastermind is enabled but {} not set",
                missing.join(", ")
            )))
        }
    }

    /// Clone host to raw-content host table, configured entries winning
    pub fn raw_host_table(&self) -> BTreeMap<String, String> {
        let mut table: BTreeMap<String, String> = DEFAULT_RAW_HOSTS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        for mapping in &self.raw_hosts {
            table.insert(mapping.clone_host.to_lowercase(), mapping.raw_host.clone());
        }
        table
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> AccessResult<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| AccessError::Config(format!("{} is not set", name)))
    }
}
