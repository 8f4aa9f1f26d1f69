//! Teardown handler
//!
//! Deletes the instance of a finished job. Deletion is idempotent: an
//! instance that is already gone counts as deleted. Only throttling is
//! retried; any other rejection is reported so a leaked VM can be chased.

use chrono::Utc;
use ember_compute::ComputeError;
use ember_core::domain::instance::Instance;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::TeardownError;
use crate::repository::{DeleteAck, InstanceRepository};
use crate::retry::{Backoff, RATE_LIMIT_ATTEMPTS, retry};

/// Deletes job instances
#[derive(Clone)]
pub struct TeardownHandler {
    repository: Arc<dyn InstanceRepository>,
    timeout: Duration,
}

impl TeardownHandler {
    /// Creates a new handler
    ///
    /// # Arguments
    /// * `timeout` - Bound on the whole deletion exchange, retries included
    pub fn new(repository: Arc<dyn InstanceRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    /// Deletes the instance and records when it was deleted
    pub async fn teardown(&self, instance: &mut Instance) -> Result<(), TeardownError> {
        self.delete(&instance.name).await?;
        instance.deleted_at = Some(Utc::now());
        Ok(())
    }

    /// Deletes an instance by name
    pub async fn delete(&self, name: &str) -> Result<(), TeardownError> {
        let request = retry(
            "Deleting instance",
            Backoff::new(RATE_LIMIT_ATTEMPTS),
            ComputeError::is_rate_limited,
            || self.repository.delete_instance(name),
        );

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(DeleteAck::Requested)) => {
                info!("Deletion of instance {} requested", name);
                Ok(())
            }
            Ok(Ok(DeleteAck::AlreadyGone)) => {
                info!("Instance {} already deleted", name);
                Ok(())
            }
            Ok(Err(e)) => Err(TeardownError::Rejected {
                instance: name.to_string(),
                source: e.error,
            }),
            Err(_) => Err(TeardownError::TimedOut {
                instance: name.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
