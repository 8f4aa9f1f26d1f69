//! Ember Compute Client
//!
//! A small, typed HTTP client for the parts of the Compute Engine v1 REST API
//! the Ember controller needs: creating, inspecting and deleting instances,
//! following zone operations, and resolving boot images from a family.
//!
//! Credentials are not minted here. Pass an OAuth access token obtained by
//! the environment (e.g. `gcloud auth print-access-token`), or a preconfigured
//! `reqwest::Client`.
//!
//! # Example
//!
//! ```no_run
//! use ember_compute::ComputeClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ember_compute::ComputeError> {
//!     let client = ComputeClient::new("my-project", "us-east1-c")
//!         .with_access_token("ya29.token");
//!
//!     for instance in client.list_instances(None).await? {
//!         println!("{} {:?}", instance.name, instance.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod images;
mod instances;
pub mod model;
mod operations;
pub mod spec;

// Re-export commonly used types
pub use error::{ComputeError, Result};
pub use instances::Deletion;
pub use model::{InstanceResource, InstanceStatus, Operation, OperationStatus};
pub use spec::{Accelerator, InstanceSpec, InstanceSpecBuilder};

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// Public Compute Engine v1 endpoint
pub const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// HTTP client for one project and zone of the Compute Engine API
#[derive(Debug, Clone)]
pub struct ComputeClient {
    /// Base URL of the API (e.g., "https://compute.googleapis.com/compute/v1")
    base_url: String,
    project: String,
    zone: String,
    /// Bearer token attached to every request, if any
    access_token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl ComputeClient {
    /// Create a new client against the public endpoint
    ///
    /// # Example
    /// ```
    /// use ember_compute::ComputeClient;
    ///
    /// let client = ComputeClient::new("my-project", "us-east1-c");
    /// assert_eq!(client.zone(), "us-east1-c");
    /// ```
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self::with_client(DEFAULT_BASE_URL, project, zone, Client::new())
    }

    /// Create a new client against another endpoint, e.g. an emulator
    pub fn with_base_url(
        base_url: impl Into<String>,
        project: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self::with_client(base_url, project, zone, Client::new())
    }

    /// Create a new client with a custom base URL and HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, or to
    /// point at an emulator.
    pub fn with_client(
        base_url: impl Into<String>,
        project: impl Into<String>,
        zone: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.into(),
            zone: zone.into(),
            access_token: None,
            client,
        }
    }

    /// Attach an OAuth access token to every request
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// URL of a zonal collection, e.g. `instances` or `operations`
    fn zone_url(&self, collection: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/{}",
            self.base_url, self.project, self.zone, collection
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ComputeError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ComputeError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
