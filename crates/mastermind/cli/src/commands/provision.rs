//! Provision AWS access for the current job

use anyhow::Context;
use mastermind_access::AccessConfig;
use mastermind_types::BuildEnvironment;

use crate::output::{render_patch, OutputFormat};

/// Execute the provision command
pub async fn execute(
    config: AccessConfig,
    build_env: &BuildEnvironment,
    agent_env: &BuildEnvironment,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if config.enabled {
        // Buildkite log group; stdout carries the patch
        eprintln!("~~~ Provision AWS access via Mastermind");
    }

    let patch = mastermind_access::provision(config, build_env, agent_env)
        .await
        .context("failed to provision AWS access")?;

    print!("{}", render_patch(&patch, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use mastermind_access::{
        AccessResult, ApiKey, ApprovalApi, ApprovalResponse, PolicySource, Provisioner,
        TokenService, TokenServiceError,
    };
    use mastermind_types::{AccessPolicyDocument, Credentials, RoleGrant, RoleRequest};

    use super::*;
    use crate::environment;

    struct NoDocument;

    #[async_trait]
    impl PolicySource for NoDocument {
        async fn fetch(&self, _env: &BuildEnvironment) -> AccessResult<Option<AccessPolicyDocument>> {
            Ok(None)
        }
    }

    struct AlwaysApprove;

    #[async_trait]
    impl ApprovalApi for AlwaysApprove {
        async fn submit(&self, _request: &RoleRequest) -> AccessResult<ApprovalResponse> {
            Ok(ApprovalResponse::Approved(RoleGrant::new(
                "arn:aws:iam::123456789012:role/mastermind/widgets",
            )))
        }
    }

    struct FixedTokens;

    #[async_trait]
    impl TokenService for FixedTokens {
        async fn caller_identity(&self) -> Result<String, TokenServiceError> {
            Ok("arn:aws:sts::123456789012:assumed-role/agent/i-0abc".to_string())
        }

        async fn assume_role(
            &self,
            _role_arn: &str,
            _session_name: &str,
        ) -> Result<Credentials, TokenServiceError> {
            Ok(Credentials::new("ASIAEXAMPLE", "secret", "token"))
        }
    }

    #[tokio::test]
    async fn test_hook_output_unsets_agent_task_credentials() {
        let agent_env = BuildEnvironment::from_iter([
            ("BUILDKITE_PIPELINE_SLUG", "widgets"),
            ("BUILDKITE_JOB_ID", "job-42"),
            ("BUILDKITE_REPO", "https://github.com/org/widgets.git"),
            ("BUILDKITE_COMMIT", "abc123"),
            ("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/v2/credentials/xyz"),
            ("AWS_REGION", "us-west-2"),
        ]);
        let build_env = environment::collect(&agent_env).unwrap();
        assert!(!build_env.contains("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI"));

        let config = AccessConfig {
            enabled: true,
            endpoint: Some("https://mastermind.example".into()),
            api_key: Some(ApiKey::new("key")),
            configs_bucket: Some("mm-configs".into()),
            aws_region: Some("us-west-2".into()),
            aws_account_id: Some("123456789012".into()),
            ..AccessConfig::default()
        };
        let provisioner = Provisioner::new(
            config,
            Arc::new(NoDocument),
            Arc::new(AlwaysApprove),
            Arc::new(FixedTokens),
        );

        let patch = provisioner.provision(&build_env, &agent_env).await.unwrap();
        let out = render_patch(&patch, OutputFormat::Exports).unwrap();

        assert!(out.starts_with("unset AWS_CONTAINER_CREDENTIALS_RELATIVE_URI\n"));
        assert!(out.contains("export MASTERMIND_ACCESS_KEY_ID='ASIAEXAMPLE'\n"));
        assert!(!out.contains("AWS_REGION"));
    }
}
