//! Storefront E2E worker harness
//!
//! Runs the per-worker bootstrap outside the browser suite, mainly for CI
//! preflight and for debugging identity or mailbox problems by hand.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use storefront_common::{ProfileKind, RuntimeConfig};
use storefront_e2e::{RunContext, RunPlan, WorkerBootstrap};

#[derive(Parser)]
#[command(name = "storefront-e2e")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML configuration file; environment values override it
    #[arg(long, env = "STOREFRONT_E2E_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Worker index used for identity derivation
    #[arg(long, env = "TEST_WORKER_INDEX", default_value_t = 0, global = true)]
    worker_index: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for readiness, provision the worker account and print the result
    Bootstrap,

    /// Print the worker identity without contacting the service
    Identity,

    /// Print the run plan for a profile
    Plan {
        /// Overrides TEST_PROFILE
        #[arg(long)]
        profile: Option<String>,
    },

    /// Request a password reset for the worker identity and print its token
    ResetToken,

    /// Reset the worker password to `user.new_password` and back again
    PasswordCycle,
}

#[derive(Serialize)]
struct PasswordCycleOutput<'a> {
    username: &'a str,
    reset_token: &'a str,
    restore_token: &'a str,
}

#[derive(Serialize)]
struct IdentityOutput<'a> {
    run_token: &'a str,
    external_run_id: bool,
    #[serde(flatten)]
    identity: &'a storefront_common::TestIdentity,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = RuntimeConfig::from_env(cli.config.as_deref()).context("loading configuration")?;
    let bootstrap = WorkerBootstrap::new(config);

    match cli.command {
        Commands::Bootstrap => {
            let run = bootstrap.run_context(cli.worker_index);
            match bootstrap.start(run).await {
                Ok(worker) => print_json(&worker.report())?,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Identity => {
            let run = bootstrap.run_context(cli.worker_index);
            let identity = bootstrap.allocator().compute(&run);
            print_json(&IdentityOutput {
                run_token: &run.run_token,
                external_run_id: run.external,
                identity: &identity,
            })?;
        }
        Commands::Plan { profile } => {
            let plan = match profile {
                Some(name) => {
                    let kind: ProfileKind = name.parse()?;
                    RunPlan::for_profile(kind, bootstrap.config())
                }
                None => bootstrap.plan(),
            };
            print_json(&plan)?;
        }
        Commands::ResetToken => {
            let run: RunContext = bootstrap.run_context(cli.worker_index);
            let worker = bootstrap.start(run).await?;
            let token = worker.request_reset_token(&worker.identity.password).await?;
            println!("{}", token);
        }
        Commands::PasswordCycle => {
            let run = bootstrap.run_context(cli.worker_index);
            let worker = bootstrap.start(run).await?;
            let cycle = worker.configured_password_cycle().await?;
            print_json(&PasswordCycleOutput {
                username: &worker.identity.username,
                reset_token: cycle.reset_token.as_str(),
                restore_token: cycle.restore_token.as_str(),
            })?;
        }
    }

    Ok(())
}
