//! Instance command handlers
//!
//! Lists and deletes instances carrying the Ember managed label, e.g. ones
//! left behind by a killed controller.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use ember_compute::{InstanceResource, InstanceStatus};
use ember_controller::GceInstanceRepository;
use ember_controller::repository::managed_instances_filter;
use ember_controller::service::TeardownHandler;
use ember_core::domain::instance::INSTANCE_NAME_PREFIX;
use ember_core::dto::metadata;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::{Overrides, load_config};

/// Instance subcommands
#[derive(Subcommand)]
pub enum InstanceCommands {
    /// List instances managed by Ember
    List,
    /// Delete managed instances
    Delete {
        /// Instance names
        names: Vec<String>,

        /// Delete every managed instance in the zone
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },
}

/// Handle instance commands
pub async fn handle_instance_command(
    command: InstanceCommands,
    overrides: &Overrides,
) -> Result<ExitCode> {
    let config = load_config(overrides)?;
    let repository = GceInstanceRepository::from_config(&config);

    match command {
        InstanceCommands::List => {
            list_instances(&repository).await?;
            Ok(ExitCode::SUCCESS)
        }
        InstanceCommands::Delete { names, all } => {
            let names = if all {
                managed_instances(&repository)
                    .await?
                    .into_iter()
                    .map(|instance| instance.name)
                    .collect()
            } else {
                names
            };
            let teardown = TeardownHandler::new(Arc::new(repository), config.operation_timeout);
            delete_instances(&teardown, &names).await
        }
    }
}

async fn managed_instances(repository: &GceInstanceRepository) -> Result<Vec<InstanceResource>> {
    let instances = repository
        .client()
        .list_instances(Some(&managed_instances_filter()))
        .await?;
    Ok(instances)
}

/// List all managed instances
async fn list_instances(repository: &GceInstanceRepository) -> Result<()> {
    let instances = managed_instances(repository).await?;

    if instances.is_empty() {
        println!("{}", "No managed instances found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} managed instance(s):", instances.len()).bold()
        );
        println!();
        for instance in instances {
            print_instance_summary(&instance);
        }
    }

    Ok(())
}

/// Delete instances by name, continuing past failures
async fn delete_instances(teardown: &TeardownHandler, names: &[String]) -> Result<ExitCode> {
    if names.is_empty() {
        println!("{}", "No instances to delete.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(foreign) = names.iter().find(|n| !n.starts_with(INSTANCE_NAME_PREFIX)) {
        bail!(
            "Refusing to delete '{}': not an Ember instance (names start with '{}')",
            foreign,
            INSTANCE_NAME_PREFIX
        );
    }

    let mut failed = 0;
    for name in names {
        match teardown.delete(name).await {
            Ok(()) => println!("  {} Deleted {}", "✓".green(), name),
            Err(e) => {
                failed += 1;
                println!("  {} {}", "✗".red(), e);
            }
        }
    }

    if failed > 0 {
        println!();
        println!("{}", format!("{} deletion(s) failed", failed).red());
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn colorize_status(status: InstanceStatus) -> ColoredString {
    let text = format!("{:?}", status).to_uppercase();
    match status {
        InstanceStatus::Running => text.green(),
        InstanceStatus::Provisioning | InstanceStatus::Staging | InstanceStatus::Repairing => {
            text.yellow()
        }
        InstanceStatus::Terminated | InstanceStatus::Stopped => text.red(),
        _ => text.normal(),
    }
}

/// Print an instance summary
fn print_instance_summary(instance: &InstanceResource) {
    println!("  {} {}", "▸".cyan(), instance.name.bold());
    println!("    Status:      {}", colorize_status(instance.status));
    if let Some(job) = instance.labels.get(metadata::JOB_LABEL) {
        println!("    Job:         {}", job.dimmed());
    }
    if let Some(machine_type) = instance.machine_type.rsplit('/').next() {
        println!("    Machine:     {}", machine_type);
    }
    println!("    Preemptible: {}", instance.is_preemptible());
    if let Some(created) = &instance.creation_timestamp {
        println!("    Created:     {}", created.dimmed());
    }
    println!();
}
