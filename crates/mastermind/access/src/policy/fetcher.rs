//! Access document retrieval.

use std::collections::BTreeMap;

use async_trait::async_trait;
use mastermind_types::{AccessPolicyDocument, BuildEnvironment};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{raw_content_url, substitute};
use crate::config::AccessConfig;
use crate::error::{AccessError, AccessResult};
use crate::retry::{retry, Attempt, RetryError, RetryPolicy};

/// Where a build's access document comes from.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch, substitute and validate the document for this build.
    ///
    /// `Ok(None)` means the repository declares no extra permissions.
    async fn fetch(&self, env: &BuildEnvironment) -> AccessResult<Option<AccessPolicyDocument>>;
}

/// Fetches access documents from the repository's raw-content host.
///
/// A 404 means the repository has no access document and is answered
/// immediately. Other HTTP and connection failures are retried; once
/// retries run out the build continues with baseline permissions unless
/// the fetcher is strict.
pub struct PolicyFetcher {
    client: Client,
    raw_hosts: BTreeMap<String, String>,
    policy: RetryPolicy,
    strict: bool,
}

impl PolicyFetcher {
    pub fn new(config: &AccessConfig) -> AccessResult<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            raw_hosts: config.raw_host_table(),
            policy: config.retry.fetch_policy(),
            strict: config.strict_policy_fetch,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Raw-content URL of this build's access document
    pub fn document_url(&self, env: &BuildEnvironment) -> AccessResult<Url> {
        raw_content_url(
            env.repo()?,
            env.commit()?,
            env.access_document_path(),
            &self.raw_hosts,
        )
    }

    /// Fetch the document at `url` and resolve it against `env`
    pub async fn fetch_url(
        &self,
        url: &Url,
        env: &BuildEnvironment,
    ) -> AccessResult<Option<AccessPolicyDocument>> {
        let fetched = retry(&self.policy, "access document", move |attempt| {
            self.fetch_once(url, attempt)
        })
        .await;

        let raw = match fetched {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(%url, "no access document, using default permissions");
                return Ok(None);
            }
            Err(RetryError::Fatal(e)) => return Err(e),
            Err(RetryError::Exhausted { attempts, last, .. }) => {
                if self.strict {
                    return Err(last);
                }
                warn!(
                    %url,
                    attempts,
                    error = %last,
                    "failed to retrieve Mastermind access document, providing only default permissions"
                );
                return Ok(None);
            }
        };

        parse_document(raw, env).map(Some)
    }

    async fn fetch_once(&self, url: &Url, attempt: u32) -> Attempt<Option<Value>> {
        debug!(%url, attempt, "fetching access document");

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retryable(e.into()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Attempt::Ready(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Retryable(AccessError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Retryable(e.into()),
        };
        match serde_json::from_str(&body) {
            Ok(value) => Attempt::Ready(Some(value)),
            Err(e) => Attempt::Fatal(AccessError::DocumentFormat(format!(
                "{} is not valid JSON: {}",
                url, e
            ))),
        }
    }
}

#[async_trait]
impl PolicySource for PolicyFetcher {
    async fn fetch(&self, env: &BuildEnvironment) -> AccessResult<Option<AccessPolicyDocument>> {
        let url = self.document_url(env)?;
        self.fetch_url(&url, env).await
    }
}

/// Substitute build variables into a raw document, then check its shape.
pub fn parse_document(raw: Value, env: &BuildEnvironment) -> AccessResult<AccessPolicyDocument> {
    let resolved = substitute(raw, env)?;

    if resolved.pointer("/common/resources").is_none() {
        return Err(AccessError::DocumentFormat(
            "access document is missing requisite \".common.resources\" list".to_string(),
        ));
    }

    serde_json::from_value(resolved).map_err(|e| AccessError::DocumentFormat(e.to_string()))
}
