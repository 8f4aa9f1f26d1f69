//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod batch;
mod instances;
mod run;

pub use instances::InstanceCommands;
pub use run::RunCommands;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use ember_controller::{Config, Dispatcher, GceInstanceRepository};
use ember_core::domain::job::JobStatus;
use ember_core::domain::outcome::{ErrorKind, JobOutcome};
use ember_core::dto::job::SubmitJob;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Overrides;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a single job and wait for its outcome
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Run every job listed in a JSON file concurrently
    Batch {
        /// JSON array of jobs ({"kind", "input_uri", "output_uri", "docker_image", "rallies_uri"?})
        file: PathBuf,

        /// Job timeout in seconds (overrides EMBER_JOB_TIMEOUT)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Inspect or clean up managed instances
    Instances {
        #[command(subcommand)]
        command: InstanceCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Returns
/// The process exit code derived from the job outcomes
pub async fn handle_command(command: Commands, mut overrides: Overrides) -> Result<ExitCode> {
    match command {
        Commands::Run { command } => run::handle_run_command(command, overrides).await,
        Commands::Batch { file, timeout } => {
            overrides.job_timeout = timeout;
            batch::handle_batch_command(&file, &overrides).await
        }
        Commands::Instances { command } => {
            instances::handle_instance_command(command, &overrides).await
        }
    }
}

/// Runs jobs to completion, cancelling all of them on Ctrl-C
///
/// Outcomes are returned in submission order. Instances are always torn
/// down before this returns, including after an interrupt.
async fn run_jobs(config: Config, requests: Vec<SubmitJob>) -> Result<Vec<JobOutcome>> {
    info!(
        "Running {} job(s) in {}/{} (image family {})",
        requests.len(),
        config.project_id,
        config.zone,
        config.image_family
    );

    let repository = Arc::new(GceInstanceRepository::from_config(&config));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(config), repository));

    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| dispatcher.submit(request))
        .collect();

    let interrupt = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received interrupt");
                eprintln!(
                    "{}",
                    "Interrupted, cancelling jobs and deleting their instances...".yellow()
                );
                dispatcher.cancel_all();
            }
        })
    };

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let id = handle.id();
        let outcome = handle
            .outcome()
            .await
            .with_context(|| format!("Job {} task failed", id))?;
        outcomes.push(outcome);
    }

    interrupt.abort();

    let summary = dispatcher.registry().summary();
    info!(
        "All jobs finished: {} succeeded, {} failed, {} preempted",
        summary.succeeded, summary.failed, summary.preempted
    );
    Ok(outcomes)
}

/// Converts a job exit code into a process exit code
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(exit_byte(code))
}

fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(u8::MAX)
}

fn colorize_status(status: JobStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        JobStatus::Succeeded => text.green(),
        JobStatus::Failed => text.red(),
        JobStatus::Preempted => text.magenta(),
        JobStatus::Pending | JobStatus::Provisioning | JobStatus::Running => text.yellow(),
    }
}

/// Who a failure is attributed to
fn failure_origin(kind: ErrorKind) -> &'static str {
    if kind.is_infrastructure() {
        "infrastructure"
    } else if kind == ErrorKind::Cancelled {
        "operator"
    } else {
        "payload"
    }
}

/// Print detailed outcome information
fn print_outcome(outcome: &JobOutcome) {
    let job = &outcome.job;

    println!("{}", "Job Outcome:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  Kind:      {}", job.kind);
    println!("  Status:    {}", colorize_status(job.status));
    println!("  Image:     {}", job.docker_image.dimmed());
    println!("  Output:    {}", job.output_uri);

    if let Some(name) = &outcome.instance_name {
        println!("  Instance:  {}", name.dimmed());
    }

    if let Some(completed) = job.completed_at {
        let duration = completed.signed_duration_since(job.submitted_at);
        println!("  Duration:  {}s", duration.num_seconds());
    }

    if let Some(code) = job.exit_code {
        println!("  Exit code: {}", code);
    }

    if let Some(failure) = &job.failure {
        println!(
            "  {}     {}: {}",
            "Error:".red(),
            failure.kind,
            failure.message
        );
        println!("  Cause:     {}", failure_origin(failure.kind));
    }

    if let Some(teardown) = &outcome.teardown_error {
        println!(
            "  {} {} (the instance may still be running)",
            "Teardown:".red().bold(),
            teardown
        );
    }
}
