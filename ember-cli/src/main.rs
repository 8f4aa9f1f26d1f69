//! Ember CLI
//!
//! Runs analysis and export jobs on preemptible Compute Engine instances,
//! one instance per job, and cleans up instances left behind.
//!
//! The process exit code carries the job result: 0 on success, the
//! container's code when the payload failed, 100-105 for controller errors.

mod commands;
mod config;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Run containerized jobs on preemptible VMs", long_about = None)]
struct Cli {
    /// Cloud project instances are created in
    #[arg(long, global = true, env = "EMBER_PROJECT_ID")]
    project: Option<String>,

    /// Zone instances are created in
    #[arg(long, global = true, env = "EMBER_ZONE")]
    zone: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for results
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=info,ember_controller=info,ember_compute=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        project: cli.project,
        zone: cli.zone,
        job_timeout: None,
    };

    match handle_command(cli.command, overrides).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
