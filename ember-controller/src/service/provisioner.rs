//! Instance provisioner
//!
//! Turns a pending job into a created preemptible instance:
//! - Validating the job against the payload contract
//! - Enforcing the managed instance limit
//! - Resolving the boot image from its family
//! - Building the instance body with the job's metadata and startup script
//!
//! Provisioning returns once the provider has finished creating the
//! instance. It never waits for the VM to boot or become reachable. An
//! instance whose insert may have been accepted is deleted again if its
//! creation is not confirmed.

use chrono::Utc;
use ember_compute::{ComputeError, InstanceSpec, InstanceSpecBuilder};
use ember_core::domain::instance::Instance;
use ember_core::domain::job::{Job, TaskKind};
use ember_core::dto::job::validate_job;
use ember_core::dto::metadata;
use std::sync::Arc;
use tokio::time::timeout_at;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ProvisionError;
use crate::repository::InstanceRepository;
use crate::retry::{Backoff, RATE_LIMIT_ATTEMPTS, retry};
use crate::service::{TeardownHandler, deadline_after};

/// Script run by the instance on boot, see `scripts/startup.sh`
pub const STARTUP_SCRIPT: &str = include_str!("../../scripts/startup.sh");

/// Creates the instance a job runs on
pub struct InstanceProvisioner {
    repository: Arc<dyn InstanceRepository>,
    config: Arc<Config>,
    cleanup: TeardownHandler,
}

impl InstanceProvisioner {
    pub fn new(repository: Arc<dyn InstanceRepository>, config: Arc<Config>) -> Self {
        Self {
            cleanup: TeardownHandler::new(repository.clone(), config.operation_timeout),
            repository,
            config,
        }
    }

    /// Creates the instance for the job
    ///
    /// # Returns
    /// The instance record once the provider confirmed the creation.
    /// Rejections are not retried; the caller may resubmit as a new job.
    /// If the insert may have been accepted but the creation is not
    /// confirmed, the instance is deleted before the error is returned.
    pub async fn provision(&self, job: &Job) -> Result<Instance, ProvisionError> {
        validate_job(job)?;

        let timeout = self.config.operation_timeout;
        let deadline = deadline_after(timeout);

        let spec = match timeout_at(deadline, self.prepare(job)).await {
            Ok(spec) => spec?,
            Err(_) => return Err(ProvisionError::TimedOut(timeout)),
        };

        // An insert cut off by the deadline may still reach the provider
        let operation = match timeout_at(deadline, self.insert(&spec)).await {
            Ok(Ok(operation)) => operation,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                self.discard(&spec.name).await;
                return Err(ProvisionError::TimedOut(timeout));
            }
        };

        let confirmed = match timeout_at(deadline, self.confirm(&operation)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::TimedOut(timeout)),
        };
        if let Err(e) = confirmed {
            self.discard(&spec.name).await;
            return Err(e);
        }

        let profile = self.config.profile(job.kind);
        info!(
            "Created instance {} for job {} ({}, {})",
            spec.name, job.id, job.kind, profile.machine_type
        );

        Ok(Instance {
            name: spec.name,
            job_id: job.id,
            zone: self.config.zone.clone(),
            machine_type: profile.machine_type.clone(),
            image_family: self.config.image_family.clone(),
            created_at: Utc::now(),
            deleted_at: None,
        })
    }

    /// Checks the instance limit and builds the instance body
    async fn prepare(&self, job: &Job) -> Result<InstanceSpec, ProvisionError> {
        let backoff = Backoff::new(RATE_LIMIT_ATTEMPTS);

        let existing = retry(
            "Counting managed instances",
            backoff,
            ComputeError::is_rate_limited,
            || self.repository.count_managed_instances(),
        )
        .await
        .map_err(|e| e.error)?;

        if existing >= self.config.max_instances {
            return Err(ProvisionError::TooManyInstances {
                limit: self.config.max_instances,
            });
        }

        let source_image = retry(
            "Resolving boot image",
            backoff,
            ComputeError::is_rate_limited,
            || {
                self.repository
                    .resolve_image(&self.config.image_project, &self.config.image_family)
            },
        )
        .await
        .map_err(|e| e.error)?;

        debug!("Job {} boots from {}", job.id, source_image);

        let template = self.instance_template(job, &source_image);
        Ok(template.build(&self.config.project_id, &self.config.zone))
    }

    async fn insert(&self, spec: &InstanceSpec) -> Result<String, ProvisionError> {
        let operation = retry(
            "Creating instance",
            Backoff::new(RATE_LIMIT_ATTEMPTS),
            ComputeError::is_rate_limited,
            || self.repository.insert_instance(spec),
        )
        .await
        .map_err(|e| e.error)?;
        Ok(operation)
    }

    /// Waits on the insert operation; reads are retried, the insert never is
    async fn confirm(&self, operation: &str) -> Result<(), ProvisionError> {
        retry(
            "Waiting for instance creation",
            Backoff::new(RATE_LIMIT_ATTEMPTS),
            ComputeError::is_rate_limited,
            || self.repository.wait_for_insert(operation),
        )
        .await
        .map_err(|e| e.error)?;
        Ok(())
    }

    /// Deletes an instance whose creation could not be confirmed
    async fn discard(&self, name: &str) {
        warn!("Creation of {} not confirmed, deleting it", name);
        if let Err(e) = self.cleanup.delete(name).await {
            error!("Instance {} may still be running: {}", name, e);
        }
    }

    /// Builds the instance template for a job
    pub fn instance_template(&self, job: &Job, source_image: &str) -> InstanceSpecBuilder {
        let profile = self.config.profile(job.kind);

        let mut template = InstanceSpecBuilder::new(
            Instance::name_for(job.id),
            source_image,
            &profile.machine_type,
        )
        .preemptible(self.config.preemptible)
        .boot_disk_gb(self.config.boot_disk_gb)
        .label(metadata::MANAGED_LABEL, "true")
        .label(metadata::JOB_LABEL, job.id.simple().to_string())
        .metadata(metadata::DOCKER_IMAGE, &job.docker_image)
        .metadata(metadata::INPUT_URI, &job.input_uri)
        .metadata(metadata::OUTPUT_URI, &job.output_uri)
        .metadata(metadata::TASK_KIND, job.kind.as_str())
        .metadata(metadata::JOB_ID, job.id.to_string())
        .metadata(metadata::PROJECT_ID, &self.config.project_id)
        .metadata(metadata::GPU, profile.gpu.to_string())
        .metadata(metadata::SERIAL_PORT_ENABLE, "false")
        .metadata(metadata::ENABLE_OSLOGIN, "false")
        .metadata(metadata::ENABLE_GUEST_ATTRIBUTES, "TRUE")
        .metadata(metadata::STARTUP_SCRIPT, STARTUP_SCRIPT);

        if job.kind == TaskKind::Analysis {
            if let Some(rallies_uri) = &job.rallies_uri {
                template = template.metadata(metadata::RALLIES_URI, rallies_uri);
            }
        }

        for accelerator in &profile.accelerators {
            template = template.accelerator(accelerator.clone());
        }

        template
    }
}
