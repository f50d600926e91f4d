//! Mastermind approval protocol
//!
//! A role request is `POST`ed to `<endpoint>/role`:
//!
//! - `200` approves it; the body carries the role ARN
//! - `202` means a decision is pending; the identical request is resubmitted
//!   after a randomized delay until the approval deadline passes
//! - `5xx` and connection failures are retried with exponential backoff
//! - anything else is fatal and reported with the response body

use std::sync::Arc;

use async_trait::async_trait;
use mastermind_types::{RoleGrant, RoleRequest};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{AccessConfig, ApiKey};
use crate::error::{AccessError, AccessResult};
use crate::retry::{retry, Attempt, RetryError, RetryPolicy};

/// Decision returned for a single submission
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalResponse {
    /// Terminal: the role was granted
    Approved(RoleGrant),
    /// No decision yet; resubmit later
    Pending,
}

/// The approval service
#[async_trait]
pub trait ApprovalApi: Send + Sync {
    /// Submit a role request once
    async fn submit(&self, request: &RoleRequest) -> AccessResult<ApprovalResponse>;
}

/// HTTP client for the Mastermind API
pub struct MastermindClient {
    client: Client,
    role_url: Url,
    api_user: String,
    api_key: ApiKey,
}

impl MastermindClient {
    pub fn new(endpoint: &str, api_user: &str, api_key: ApiKey, config: &AccessConfig) -> AccessResult<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            role_url: role_url(endpoint)?,
            api_user: api_user.to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &AccessConfig) -> AccessResult<Self> {
        let endpoint = AccessConfig::required(&config.endpoint, "MASTERMIND_ENDPOINT")?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AccessError::Config("MASTERMIND_API_KEY is not set".to_string()))?;
        Self::new(endpoint, &config.api_user, api_key, config)
    }
}

/// `<endpoint>/role`, tolerating a trailing slash on the endpoint
fn role_url(endpoint: &str) -> AccessResult<Url> {
    let base = format!("{}/", endpoint.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|base| base.join("role"))
        .map_err(|e| AccessError::Config(format!("invalid MASTERMIND_ENDPOINT {}: {}", endpoint, e)))
}

#[async_trait]
impl ApprovalApi for MastermindClient {
    async fn submit(&self, request: &RoleRequest) -> AccessResult<ApprovalResponse> {
        let response = self
            .client
            .post(self.role_url.clone())
            .basic_auth(&self.api_user, Some(self.api_key.expose()))
            .json(request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(ApprovalResponse::Approved(response.json().await?)),
            StatusCode::ACCEPTED => Ok(ApprovalResponse::Pending),
            status => {
                let body = response.text().await.unwrap_or_default();
                error!(status = status.as_u16(), %body, "error from Mastermind while requesting role");
                Err(AccessError::Http {
                    status: status.as_u16(),
                    url: self.role_url.to_string(),
                    body,
                })
            }
        }
    }
}

/// Drives a role request to a decision
pub struct ApprovalPoller {
    api: Arc<dyn ApprovalApi>,
    pending: RetryPolicy,
    transient: RetryPolicy,
}

impl ApprovalPoller {
    /// `pending` bounds the wait for a decision, `transient` the retries of
    /// a single submission that failed with a server or connection error.
    pub fn new(api: Arc<dyn ApprovalApi>, pending: RetryPolicy, transient: RetryPolicy) -> Self {
        Self {
            api,
            pending,
            transient,
        }
    }

    pub fn from_config(api: Arc<dyn ApprovalApi>, config: &AccessConfig) -> Self {
        Self::new(
            api,
            config.retry.pending_policy(),
            config.retry.approval_policy(),
        )
    }

    /// Submit `request` until it is approved, rejected or the deadline passes
    pub async fn request_access(&self, request: &RoleRequest) -> AccessResult<RoleGrant> {
        info!(project = %request.project_identifier, "requesting role from Mastermind");
        debug!(
            request = %serde_json::to_string(request).unwrap_or_default(),
            "role request"
        );

        let decision = retry(&self.pending, "approval", move |attempt| async move {
            match self.submit_once(request).await {
                Ok(ApprovalResponse::Approved(grant)) => Attempt::Ready(grant),
                Ok(ApprovalResponse::Pending) => {
                    info!(attempt, "role request pending approval");
                    Attempt::Retryable(AccessError::ApprovalPending)
                }
                Err(e) => Attempt::Fatal(e),
            }
        })
        .await;

        match decision {
            Ok(grant) => {
                info!(arn = %grant.arn, "role approved");
                Ok(grant)
            }
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted {
                attempts, elapsed, ..
            }) => {
                warn!(attempts, ?elapsed, "timed out waiting for Mastermind approval");
                Err(AccessError::Timeout {
                    waited_secs: elapsed.as_secs(),
                    attempts,
                })
            }
        }
    }

    /// One submission, retrying transient failures
    async fn submit_once(&self, request: &RoleRequest) -> AccessResult<ApprovalResponse> {
        retry(&self.transient, "role submission", move |_| async move {
            Attempt::from_result(self.api.submit(request).await)
        })
        .await
        .map_err(RetryError::into_error)
    }
}
