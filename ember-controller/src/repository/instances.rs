//! Instances repository
//!
//! Handles communication with the Compute Engine API for instance-related
//! operations:
//! - Resolving boot images
//! - Counting managed instances
//! - Creating and deleting instances
//! - Reading provider state and the completion marker

use async_trait::async_trait;
use ember_compute::{ComputeClient, Deletion, InstanceSpec, InstanceStatus, Result};
use ember_core::dto::metadata;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

/// What the provider says about an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// Provisioning, staging or running
    Active,
    /// Stopped or terminated without a preemption record
    Stopped,
    /// Reclaimed by the provider
    Preempted,
    /// The instance does not exist
    Missing,
}

/// Outcome of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAck {
    Requested,
    AlreadyGone,
}

/// Repository trait for instance operations against the cloud provider
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Resolves the self link of the newest image in a family
    async fn resolve_image(&self, project: &str, family: &str) -> Result<String>;

    /// Counts instances carrying the managed label
    async fn count_managed_instances(&self) -> Result<usize>;

    /// Sends the insert request for an instance
    ///
    /// Returns the name of the operation tracking the creation. From this
    /// point on the provider may hold an instance named `spec.name`.
    async fn insert_instance(&self, spec: &InstanceSpec) -> Result<String>;

    /// Waits for an accepted insert to finish
    ///
    /// Fails if the operation ended with an error, e.g. an exhausted zone.
    async fn wait_for_insert(&self, operation: &str) -> Result<()>;

    /// Reads the provider-level state of an instance
    async fn instance_state(&self, name: &str) -> Result<ProviderState>;

    /// Reads the raw completion marker, `None` while the payload is running
    async fn completion_marker(&self, name: &str) -> Result<Option<String>>;

    /// Requests deletion; a missing instance is not an error
    async fn delete_instance(&self, name: &str) -> Result<DeleteAck>;
}

/// List filter matching every instance created by Ember
pub fn managed_instances_filter() -> String {
    format!("labels.{} = \"true\"", metadata::MANAGED_LABEL)
}

/// Compute Engine implementation of InstanceRepository
pub struct GceInstanceRepository {
    client: ComputeClient,
    operation_poll_interval: Duration,
}

impl GceInstanceRepository {
    /// Creates a new repository
    ///
    /// # Arguments
    /// * `client` - Compute client bound to the controller's project and zone
    pub fn new(client: ComputeClient) -> Self {
        Self {
            client,
            operation_poll_interval: Duration::from_secs(1),
        }
    }

    /// Creates a repository for the configured project and zone
    pub fn from_config(config: &Config) -> Self {
        let mut client =
            ComputeClient::with_base_url(&config.compute_url, &config.project_id, &config.zone);
        if let Some(token) = &config.access_token {
            client = client.with_access_token(token);
        }
        Self::new(client)
    }

    pub fn client(&self) -> &ComputeClient {
        &self.client
    }
}

#[async_trait]
impl InstanceRepository for GceInstanceRepository {
    async fn resolve_image(&self, project: &str, family: &str) -> Result<String> {
        let image = self.client.image_from_family(project, family).await?;
        Ok(image.self_link)
    }

    async fn count_managed_instances(&self) -> Result<usize> {
        let instances = self
            .client
            .list_instances(Some(&managed_instances_filter()))
            .await?;
        Ok(instances.len())
    }

    async fn insert_instance(&self, spec: &InstanceSpec) -> Result<String> {
        let operation = self.client.insert_instance(spec).await?;
        debug!("Insert of {} accepted as {}", spec.name, operation.name);
        Ok(operation.name)
    }

    async fn wait_for_insert(&self, operation: &str) -> Result<()> {
        self.client
            .wait_for_operation(operation, self.operation_poll_interval)
            .await?;
        Ok(())
    }

    async fn instance_state(&self, name: &str) -> Result<ProviderState> {
        let instance = match self.client.get_instance(name).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(ProviderState::Missing),
            Err(e) => return Err(e),
        };

        debug!("Instance {} status: {:?}", name, instance.status);

        if instance.status.is_active() || instance.status == InstanceStatus::Unknown {
            return Ok(ProviderState::Active);
        }

        if instance.is_preemptible() && self.client.was_preempted(&instance.self_link).await? {
            return Ok(ProviderState::Preempted);
        }

        Ok(ProviderState::Stopped)
    }

    async fn completion_marker(&self, name: &str) -> Result<Option<String>> {
        self.client
            .get_guest_attribute(name, &metadata::marker_path())
            .await
    }

    async fn delete_instance(&self, name: &str) -> Result<DeleteAck> {
        match self.client.delete_instance(name).await? {
            Deletion::Requested(operation) => {
                debug!("Deletion of {} started as {}", name, operation.name);
                Ok(DeleteAck::Requested)
            }
            Deletion::AlreadyGone => Ok(DeleteAck::AlreadyGone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_filter() {
        assert_eq!(managed_instances_filter(), "labels.ember-managed = \"true\"");
    }

    #[test]
    fn test_from_config_targets_configured_zone() {
        let mut config = Config::new("proj".to_string());
        config.zone = "europe-west4-a".to_string();
        config.compute_url = "http://localhost:9000/".to_string();

        let repo = GceInstanceRepository::from_config(&config);
        assert_eq!(repo.client().project(), "proj");
        assert_eq!(repo.client().zone(), "europe-west4-a");
        assert_eq!(repo.client().base_url(), "http://localhost:9000");
    }
}
