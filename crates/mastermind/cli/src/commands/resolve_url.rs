//! Show where the job's access document is fetched from

use mastermind_access::{AccessConfig, PolicyFetcher};
use mastermind_types::BuildEnvironment;

/// Execute the resolve-url command
pub fn execute(config: &AccessConfig, build_env: &BuildEnvironment) -> anyhow::Result<()> {
    let url = PolicyFetcher::new(config)?.document_url(build_env)?;
    println!("{}", url);
    Ok(())
}
