//! Batch command handler
//!
//! Runs every job of a JSON file concurrently and prints one line per job.

use anyhow::{Context, Result};
use colored::*;
use ember_core::domain::outcome::JobOutcome;
use ember_core::dto::job::SubmitJob;
use std::path::Path;
use std::process::ExitCode;

use super::{colorize_status, exit_code, print_outcome, run_jobs};
use crate::config::{Overrides, load_config};

/// Handle the batch command
///
/// The exit code is that of the first job, in file order, that did not
/// succeed, or 0 when all of them did.
pub async fn handle_batch_command(file: &Path, overrides: &Overrides) -> Result<ExitCode> {
    let requests = read_jobs(file)?;

    if requests.is_empty() {
        println!("{}", "No jobs in file.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(overrides)?;
    println!(
        "{}",
        format!(
            "Running {} job(s), at most {} at a time",
            requests.len(),
            config.max_parallel_jobs
        )
        .bold()
    );

    let outcomes = run_jobs(config, requests).await?;

    println!();
    for outcome in &outcomes {
        print_summary(outcome);
    }
    println!(
        "{}",
        format!("{}/{} job(s) succeeded", succeeded(&outcomes), outcomes.len()).bold()
    );
    for outcome in outcomes.iter().filter(|o| o.teardown_error.is_some()) {
        println!();
        print_outcome(outcome);
    }

    Ok(exit_code(batch_exit_code(&outcomes)))
}

fn read_jobs(file: &Path) -> Result<Vec<SubmitJob>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse jobs from {}", file.display()))
}

fn succeeded(outcomes: &[JobOutcome]) -> usize {
    outcomes.iter().filter(|o| o.succeeded()).count()
}

fn batch_exit_code(outcomes: &[JobOutcome]) -> i32 {
    outcomes
        .iter()
        .map(JobOutcome::exit_code)
        .find(|code| *code != 0)
        .unwrap_or(0)
}

/// Print a one-line outcome summary
fn print_summary(outcome: &JobOutcome) {
    let job = &outcome.job;
    let detail = match &job.failure {
        Some(failure) => format!("{}: {}", failure.kind, failure.message),
        None => String::new(),
    };

    println!(
        "  {} {} {:<8} {:<11} exit {:<3} {}",
        "▸".cyan(),
        job.id.to_string().dimmed(),
        job.kind,
        colorize_status(job.status),
        outcome.exit_code(),
        detail.dimmed()
    );
}
