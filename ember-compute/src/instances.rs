//! Instance endpoints

use reqwest::Method;
use tracing::{debug, info};

use crate::ComputeClient;
use crate::error::{ComputeError, Result};
use crate::model::{GuestAttribute, InstanceList, InstanceResource, Operation};
use crate::spec::InstanceSpec;

/// Result of a delete request
#[derive(Debug, Clone)]
pub enum Deletion {
    /// The API accepted the request and started an operation
    Requested(Operation),
    /// The instance did not exist
    AlreadyGone,
}

impl ComputeClient {
    // =============================================================================
    // Instance Lifecycle
    // =============================================================================

    /// Request creation of an instance
    ///
    /// Returns the zone operation tracking the creation; the instance is not
    /// necessarily running when this returns.
    pub async fn insert_instance(&self, spec: &InstanceSpec) -> Result<Operation> {
        info!("Creating instance {} in {}", spec.name, self.zone);
        let url = self.zone_url("instances");
        let response = self.request(Method::POST, &url).json(spec).send().await?;

        self.handle_response(response).await
    }

    /// Get an instance by name
    pub async fn get_instance(&self, name: &str) -> Result<InstanceResource> {
        let url = format!("{}/{}", self.zone_url("instances"), name);
        let response = self.request(Method::GET, &url).send().await?;

        self.handle_response(response).await
    }

    /// List instances in the zone, following pagination
    ///
    /// # Arguments
    /// * `filter` - Optional API filter expression (e.g. `labels.ember-managed = "true"`)
    pub async fn list_instances(&self, filter: Option<&str>) -> Result<Vec<InstanceResource>> {
        let url = self.zone_url("instances");
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(filter) = filter {
                query.push(("filter", filter));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self.request(Method::GET, &url).query(&query).send().await?;
            let page: InstanceList = self.handle_response(response).await?;
            instances.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} instance(s) in {}", instances.len(), self.zone);
        Ok(instances)
    }

    /// Request deletion of an instance
    ///
    /// A missing instance is reported as [`Deletion::AlreadyGone`] rather than
    /// an error, so repeated deletes are harmless.
    pub async fn delete_instance(&self, name: &str) -> Result<Deletion> {
        info!("Deleting instance {}", name);
        let url = format!("{}/{}", self.zone_url("instances"), name);
        let response = self.request(Method::DELETE, &url).send().await?;

        match self.handle_response::<Operation>(response).await {
            Ok(operation) => Ok(Deletion::Requested(operation)),
            Err(e) if e.is_not_found() => {
                debug!("Instance {} already deleted", name);
                Ok(Deletion::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    // =============================================================================
    // Guest Attributes
    // =============================================================================

    /// Read a single guest attribute written from inside the instance
    ///
    /// # Arguments
    /// * `name` - Instance name
    /// * `key` - Attribute path as `namespace/key`
    ///
    /// # Returns
    /// `None` when the attribute has not been written yet
    pub async fn get_guest_attribute(&self, name: &str, key: &str) -> Result<Option<String>> {
        if !key.contains('/') {
            return Err(ComputeError::InvalidRequest(format!(
                "guest attribute key '{}' must be namespace/key",
                key
            )));
        }

        let url = format!("{}/{}/getGuestAttributes", self.zone_url("instances"), name);
        let response = self
            .request(Method::GET, &url)
            .query(&[("variableKey", key)])
            .send()
            .await?;

        match self.handle_response::<GuestAttribute>(response).await {
            Ok(attribute) => Ok(Some(attribute.variable_value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
