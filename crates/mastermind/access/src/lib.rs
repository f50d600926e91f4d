//! # Mastermind Access
//!
//! Brokers short-lived, least-privilege AWS credentials for a Buildkite job
//! through the Mastermind approval service.
//!
//! ## Overview
//!
//! [`Provisioner`] runs the stages in order, each against an unreliable
//! external system with its own retry policy:
//!
//! 1. [`PolicyFetcher`]: the repository's access document from its raw-content
//!    host. A 404 means "baseline permissions only".
//! 2. [`RoleRequestBuilder`]: baseline permissions plus the document's resources
//! 3. [`ApprovalPoller`]: submits the request until Mastermind approves it,
//!    rejects it or the approval deadline passes
//! 4. [`CredentialExchanger`]: assumes the approved role via STS
//!
//! The result is an [`EnvPatch`](mastermind_types::EnvPatch) for the job's
//! environment.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mastermind_access::{AccessConfig, Provisioner};
//! use mastermind_types::BuildEnvironment;
//!
//! # async fn example() -> mastermind_access::AccessResult<()> {
//! let config = AccessConfig::load(None)?;
//! let agent_env: BuildEnvironment = std::env::vars().collect();
//! let env: BuildEnvironment = agent_env
//!     .iter()
//!     .filter(|(name, _)| name.starts_with("BUILDKITE_"))
//!     .collect();
//!
//! let provisioner = Provisioner::connect(config).await?;
//! let patch = provisioner.provision(&env, &agent_env).await?;
//! for (name, _) in patch.assignments() {
//!     println!("provisioned {}", name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! Every stage classifies each attempt as ready, retryable or fatal and hands
//! it to [`retry`] with a [`RetryPolicy`]:
//!
//! | Stage | Retried on | Policy |
//! |---|---|---|
//! | Access document | 5xx, connection failure | 4 attempts, exponential |
//! | Approval (pending) | 202 | 10 minute deadline, randomized 1-5s |
//! | Approval (submission) | 5xx, connection failure | 4 attempts, exponential |
//! | Role assumption | STS service errors | 60 second deadline, exponential |

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod approval;
pub mod config;
pub mod credentials;
pub mod error;
pub mod policy;
pub mod provision;
pub mod request;
pub mod retry;

// Re-exports
pub use approval::{ApprovalApi, ApprovalPoller, ApprovalResponse, MastermindClient};
pub use config::{AccessConfig, ApiKey, RawHostMapping, RetryConfig};
pub use credentials::{CredentialExchanger, StsTokenService, TokenService, TokenServiceError};
pub use error::{AccessError, AccessResult};
pub use policy::{parse_document, raw_content_url, substitute, PolicyFetcher, PolicySource};
pub use provision::{pass_through, provision, role_request, Provisioner};
pub use request::{BaselineSettings, RoleRequestBuilder};
pub use retry::{retry, Attempt, Backoff, RetryError, RetryPolicy};
