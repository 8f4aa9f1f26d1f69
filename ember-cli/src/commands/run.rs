//! Run command handlers
//!
//! Runs a single analysis or export job and reports its outcome.

use anyhow::Result;
use clap::{Args, Subcommand};
use ember_core::domain::job::TaskKind;
use ember_core::dto::job::SubmitJob;
use std::process::ExitCode;

use super::{exit_code, print_outcome, run_jobs};
use crate::config::{Overrides, load_config};

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Run an analysis job on a GPU instance
    Analysis {
        #[command(flatten)]
        job: JobArgs,

        /// Rally annotations for the input video
        #[arg(long)]
        rallies: Option<String>,
    },
    /// Run an export job
    Export {
        #[command(flatten)]
        job: JobArgs,
    },
}

/// Arguments shared by every job kind
#[derive(Args)]
pub struct JobArgs {
    /// Input location (e.g. gs://bucket/match.mp4)
    #[arg(long)]
    input: String,

    /// Output location (e.g. gs://bucket/results/)
    #[arg(long)]
    output: String,

    /// Docker image with a tag or digest
    #[arg(long)]
    image: String,

    /// Job timeout in seconds (overrides EMBER_JOB_TIMEOUT)
    #[arg(long)]
    timeout: Option<u64>,
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, mut overrides: Overrides) -> Result<ExitCode> {
    let (request, timeout) = match command {
        RunCommands::Analysis { job, rallies } => {
            let timeout = job.timeout;
            (submission(TaskKind::Analysis, job, rallies), timeout)
        }
        RunCommands::Export { job } => {
            let timeout = job.timeout;
            (submission(TaskKind::Export, job, None), timeout)
        }
    };

    overrides.job_timeout = timeout;
    let config = load_config(&overrides)?;

    let outcomes = run_jobs(config, vec![request]).await?;
    let mut code = 0;
    for outcome in &outcomes {
        print_outcome(outcome);
        code = outcome.exit_code();
    }

    Ok(exit_code(code))
}

fn submission(kind: TaskKind, job: JobArgs, rallies_uri: Option<String>) -> SubmitJob {
    SubmitJob {
        kind,
        input_uri: job.input,
        output_uri: job.output,
        rallies_uri,
        docker_image: job.image,
    }
}
