//! End-to-end access provisioning for one build
//!
//! ```text
//! fetch document -> build role request -> await approval -> assume role -> EnvPatch
//! ```
//!
//! Every stage runs strictly after the previous one. The build environment is
//! never mutated; the caller applies the returned [`EnvPatch`].

use std::sync::Arc;

use mastermind_types::{
    vars, BuildEnvironment, Credentials, EnvPatch, Principal, ProjectIdentifier, RoleRequest,
};
use tracing::{debug, info};

use crate::approval::{ApprovalApi, ApprovalPoller, MastermindClient};
use crate::config::AccessConfig;
use crate::credentials::{CredentialExchanger, StsTokenService, TokenService};
use crate::error::{AccessError, AccessResult};
use crate::policy::{PolicyFetcher, PolicySource};
use crate::request::{BaselineSettings, RoleRequestBuilder};

/// Sequences the provisioning stages against their collaborators
pub struct Provisioner {
    config: AccessConfig,
    policies: Arc<dyn PolicySource>,
    approvals: ApprovalPoller,
    tokens: Arc<dyn TokenService>,
    exchanger: CredentialExchanger,
}

impl Provisioner {
    /// Wire the stages to the given collaborators, using the configured retry policies
    pub fn new(
        config: AccessConfig,
        policies: Arc<dyn PolicySource>,
        approvals: Arc<dyn ApprovalApi>,
        tokens: Arc<dyn TokenService>,
    ) -> Self {
        let approvals = ApprovalPoller::from_config(approvals, &config);
        let exchanger = CredentialExchanger::new(tokens.clone(), config.retry.exchange_policy());

        Self {
            config,
            policies,
            approvals,
            tokens,
            exchanger,
        }
    }

    /// Production wiring: raw-content fetcher, Mastermind HTTP client and AWS STS
    pub async fn connect(config: AccessConfig) -> AccessResult<Self> {
        config.validate()?;

        let policies = Arc::new(PolicyFetcher::new(&config)?);
        let approvals = Arc::new(MastermindClient::from_config(&config)?);
        let tokens = Arc::new(StsTokenService::from_env().await);

        Ok(Self::new(config, policies, approvals, tokens))
    }

    /// Provision Mastermind credentials for the build described by `env`.
    ///
    /// The patch sets the Mastermind credential variables and the config
    /// file pointer, and removes ambient AWS credentials present in either
    /// `env` or the hook's own `agent_env`.
    pub async fn provision(
        &self,
        env: &BuildEnvironment,
        agent_env: &BuildEnvironment,
    ) -> AccessResult<EnvPatch> {
        self.config.validate()?;
        let configs_bucket =
            AccessConfig::required(&self.config.configs_bucket, "MASTERMIND_CONFIGS_BUCKET")?;
        let job_id = env.job_id()?;

        let request = self.role_request(env).await?;
        let grant = self.approvals.request_access(&request).await?;

        let session_name = session_name(job_id);
        let credentials = self.exchanger.exchange(&grant.arn, &session_name).await?;

        let patch = credential_patch(
            [env, agent_env],
            &credentials,
            &config_file_url(configs_bucket, &request.project_identifier),
        );
        info!(
            project = %request.project_identifier,
            removed = patch.removals().count(),
            "Mastermind credentials provisioned"
        );
        Ok(patch)
    }

    /// The request that would be submitted for `env`
    pub async fn role_request(&self, env: &BuildEnvironment) -> AccessResult<RoleRequest> {
        role_request(
            &self.config,
            self.policies.as_ref(),
            self.tokens.as_ref(),
            env,
        )
        .await
    }
}

/// Fetch the access document and assemble the role request for `env`,
/// without contacting Mastermind
pub async fn role_request(
    config: &AccessConfig,
    policies: &dyn PolicySource,
    tokens: &dyn TokenService,
    env: &BuildEnvironment,
) -> AccessResult<RoleRequest> {
    // Fail on missing identifiers before any network call
    env.pipeline_slug()?;
    let baseline = BaselineSettings::from_config(config)?;

    let (repo, commit) = (env.repo()?, env.commit()?);
    info!(
        repo,
        commit,
        path = env.access_document_path(),
        "fetching access document"
    );
    let document = policies.fetch(env).await?;
    if let Some(document) = &document {
        info!(resources = document.resources().len(), "access document loaded");
    }

    let principal = principal(config, tokens).await?;
    let request = RoleRequestBuilder::new(baseline, principal).build(env, document.as_ref())?;
    debug!(resources = request.resources().len(), "role request assembled");
    Ok(request)
}

/// Configured task role, or the identity the agent runs as
async fn principal(config: &AccessConfig, tokens: &dyn TokenService) -> AccessResult<Principal> {
    if let Some(arn) = &config.task_role_arn {
        return Ok(Principal::aws(arn.clone()));
    }

    let arn = tokens
        .caller_identity()
        .await
        .map_err(|e| AccessError::CredentialService(format!("caller identity: {}", e)))?;
    debug!(%arn, "resolved caller identity");
    Ok(Principal::aws(arn))
}

/// Provision the build: Mastermind credentials when enabled, the agent's
/// own AWS credentials otherwise.
pub async fn provision(
    config: AccessConfig,
    env: &BuildEnvironment,
    agent_env: &BuildEnvironment,
) -> AccessResult<EnvPatch> {
    if !config.enabled {
        info!("Mastermind disabled, passing agent AWS credentials through");
        return Ok(pass_through(agent_env));
    }

    Provisioner::connect(config)
        .await?
        .provision(env, agent_env)
        .await
}

/// Copy the agent's ambient AWS credentials into the build
pub fn pass_through(agent_env: &BuildEnvironment) -> EnvPatch {
    let mut patch = EnvPatch::new();
    for name in vars::AMBIENT_AWS_CREDENTIALS {
        if let Some(value) = agent_env.get(name) {
            patch.set(name, value);
        }
    }
    patch
}

/// Role session name for a job
pub fn session_name(job_id: &str) -> String {
    format!("buildkite@job-{}", job_id)
}

/// `s3://<bucket>/aws_configs/<project>/build/config`
pub fn config_file_url(configs_bucket: &str, project: &ProjectIdentifier) -> String {
    format!("s3://{}/aws_configs/{}/build/config", configs_bucket, project)
}

fn credential_patch(
    sources: [&BuildEnvironment; 2],
    credentials: &Credentials,
    config_file_url: &str,
) -> EnvPatch {
    let mut patch = EnvPatch::new();
    patch
        .set(vars::MASTERMIND_ACCESS_KEY_ID, &credentials.access_key_id)
        .set(vars::MASTERMIND_SECRET_ACCESS_KEY, &credentials.secret_access_key)
        .set(vars::MASTERMIND_SESSION_TOKEN, &credentials.session_token)
        .set(vars::MASTERMIND_AWS_CONFIG_FILE_URL, config_file_url);

    // The hook process holds the agent's task credentials even when the
    // job environment does not
    for name in vars::AMBIENT_AWS_CREDENTIALS {
        if sources.iter().any(|env| env.contains(name)) {
            patch.unset(name);
        }
    }
    patch
}
