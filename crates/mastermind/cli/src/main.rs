//! Buildkite Mastermind hook - AWS access for build jobs
//!
//! Runs on the agent before a job's container starts:
//! - Collects the job's build environment
//! - Provisions Mastermind credentials (or passes the agent's through)
//! - Prints the resulting environment changes for the hook to apply

use clap::{Parser, Subcommand};
use mastermind_access::AccessConfig;
use mastermind_types::{vars, BuildEnvironment};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod environment;
mod output;

use commands::{provision, resolve_url, role_request};
use output::OutputFormat;

/// Buildkite Mastermind CLI
#[derive(Parser)]
#[command(name = "buildkite-mastermind")]
#[command(about = "Provision least-privilege AWS access for Buildkite jobs via Mastermind", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MASTERMIND_CONFIG")]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "MASTERMIND_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Provision AWS access for the current job and print the environment changes
    Provision {
        /// Output format
        #[arg(short, long, value_enum, default_value = "exports")]
        format: OutputFormat,
    },

    /// Print the role request that would be submitted, without submitting it
    RoleRequest,

    /// Print the URL of the job's access document
    ResolveUrl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let agent_env: BuildEnvironment = std::env::vars().collect();

    // Initialize tracing; stdout is reserved for command output
    let debug = cli.verbose || agent_env.get(vars::AGENT_DEBUG) == Some("true");
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| (if debug { "debug" } else { "info" }).into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    let config = AccessConfig::load(cli.config.as_deref())?;
    let build_env = environment::collect(&agent_env)?;

    match cli.command {
        Commands::Provision { format } => {
            provision::execute(config, &build_env, &agent_env, format).await
        }
        Commands::RoleRequest => role_request::execute(&config, &build_env).await,
        Commands::ResolveUrl => resolve_url::execute(&config, &build_env),
    }
}
