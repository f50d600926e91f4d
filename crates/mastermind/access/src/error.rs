//! Error types for mastermind-access

use mastermind_types::MissingVariable;
use thiserror::Error;

/// Errors raised while provisioning access for a build
#[derive(Debug, Error)]
pub enum AccessError {
    /// Clone URL scheme or host cannot be mapped to a raw-content endpoint
    #[error("unsupported repository source: {0}")]
    UnsupportedSource(String),

    /// Access document is not valid JSON or lacks `.common.resources`
    #[error("access document format error: {0}")]
    DocumentFormat(String),

    /// Access document references a variable the build does not define
    #[error("access document references undefined variable @@{0}@@")]
    MissingVariable(String),

    /// Required build variable absent
    #[error(transparent)]
    MissingBuildVariable(#[from] MissingVariable),

    /// Unexpected HTTP status
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Connection, TLS or body decoding failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Mastermind has not decided yet
    #[error("role request pending approval")]
    ApprovalPending,

    /// No approval decision before the deadline
    #[error("timed out after {waited_secs}s waiting for Mastermind approval ({attempts} requests)")]
    Timeout { waited_secs: u64, attempts: u32 },

    /// Token service unavailable or refused the role
    #[error("credential service error: {0}")]
    CredentialService(String),

    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl AccessError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AccessError::Http { status, .. } => Some(*status),
            AccessError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-side and connection failures worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            AccessError::Http { status, .. } => (500..600).contains(status),
            AccessError::Transport(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for AccessError {
    fn from(e: config::ConfigError) -> Self {
        AccessError::Config(e.to_string())
    }
}

/// Result type for access provisioning
pub type AccessResult<T> = Result<T, AccessError>;
