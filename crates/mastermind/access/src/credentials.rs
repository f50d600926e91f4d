//! Role assumption against AWS STS

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_sts::error::{DisplayErrorContext, SdkError};
use mastermind_types::Credentials;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{AccessError, AccessResult};
use crate::retry::{retry, Attempt, RetryError, RetryPolicy};

/// Failure reported by the token service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenServiceError {
    /// The service answered with an error (throttling, backend failure, access denied)
    #[error("{0}")]
    Service(String),

    /// Request could not be built, sent or read
    #[error("{0}")]
    Other(String),
}

/// The AWS token service
#[async_trait]
pub trait TokenService: Send + Sync {
    /// ARN of the identity the agent is running as
    async fn caller_identity(&self) -> Result<String, TokenServiceError>;

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, TokenServiceError>;
}

/// [`TokenService`] backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct StsTokenService {
    client: aws_sdk_sts::Client,
}

impl StsTokenService {
    pub fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }

    /// Client configured from the agent's default credential chain
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sts::Client::new(&sdk_config))
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> TokenServiceError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => TokenServiceError::Service(message),
        _ => TokenServiceError::Other(message),
    }
}

#[async_trait]
impl TokenService for StsTokenService {
    async fn caller_identity(&self) -> Result<String, TokenServiceError> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(classify)?;

        output
            .arn()
            .map(str::to_string)
            .ok_or_else(|| TokenServiceError::Other("caller identity has no ARN".to_string()))
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, TokenServiceError> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(classify)?;

        let issued = output.credentials().ok_or_else(|| {
            TokenServiceError::Other(format!("no credentials returned for {}", role_arn))
        })?;

        Ok(Credentials::new(
            issued.access_key_id(),
            issued.secret_access_key(),
            issued.session_token(),
        ))
    }
}

/// Exchanges an approved role for short-lived credentials.
///
/// Only [`TokenServiceError::Service`] failures are retried, with
/// exponential backoff until the policy's deadline.
pub struct CredentialExchanger {
    tokens: Arc<dyn TokenService>,
    policy: RetryPolicy,
}

impl CredentialExchanger {
    pub fn new(tokens: Arc<dyn TokenService>, policy: RetryPolicy) -> Self {
        Self { tokens, policy }
    }

    pub async fn exchange(&self, role_arn: &str, session_name: &str) -> AccessResult<Credentials> {
        info!(role_arn, session_name, "assuming Mastermind role");

        let tokens = &self.tokens;
        let exchanged = retry(&self.policy, "credential exchange", move |attempt| async move {
            debug!(attempt, role_arn, "assume role");
            match tokens.assume_role(role_arn, session_name).await {
                Ok(credentials) => Attempt::Ready(credentials),
                Err(TokenServiceError::Service(e)) => {
                    Attempt::Retryable(AccessError::CredentialService(e))
                }
                Err(TokenServiceError::Other(e)) => {
                    Attempt::Fatal(AccessError::CredentialService(e))
                }
            }
        })
        .await;

        match exchanged {
            Ok(credentials) => Ok(credentials),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted {
                attempts,
                elapsed,
                last,
            }) => Err(AccessError::CredentialService(format!(
                "gave up after {} attempts in {}s: {}",
                attempts,
                elapsed.as_secs(),
                last
            ))),
        }
    }
}
