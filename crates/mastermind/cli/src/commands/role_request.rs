//! Preview the role request for the current job

use anyhow::Context;
use mastermind_access::{AccessConfig, PolicyFetcher, StsTokenService};
use mastermind_types::BuildEnvironment;

/// Execute the role-request command
pub async fn execute(config: &AccessConfig, build_env: &BuildEnvironment) -> anyhow::Result<()> {
    let policies = PolicyFetcher::new(config)?;
    let tokens = StsTokenService::from_env().await;

    let request = mastermind_access::role_request(config, &policies, &tokens, build_env)
        .await
        .context("failed to assemble role request")?;

    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
