//! Zone operation endpoints

use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info};

use crate::ComputeClient;
use crate::error::{ComputeError, Result};
use crate::model::{Operation, OperationList, OperationStatus};

/// Operation type recorded when the provider reclaims a preemptible instance
pub const PREEMPTED_OPERATION_TYPE: &str = "compute.instances.preempted";

const RESOURCE_POOL_EXHAUSTED: &str = "ZONE_RESOURCE_POOL_EXHAUSTED";

impl ComputeClient {
    /// Get a zone operation by name
    pub async fn get_operation(&self, operation: &str) -> Result<Operation> {
        let url = format!("{}/{}", self.zone_url("operations"), operation);
        let response = self.request(Method::GET, &url).send().await?;

        self.handle_response(response).await
    }

    /// Poll a zone operation until it is done
    ///
    /// The caller bounds the total wait; this loops until the API reports
    /// `DONE` and then maps any recorded error.
    pub async fn wait_for_operation(&self, operation: &str, interval: Duration) -> Result<Operation> {
        info!("Waiting for operation {} to finish", operation);
        loop {
            let result = self.get_operation(operation).await?;
            if result.status == OperationStatus::Done {
                debug!("Operation {} done", operation);
                return check_operation(result);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// List zone operations matching a filter, following pagination
    pub async fn list_operations(&self, filter: &str) -> Result<Vec<Operation>> {
        let url = self.zone_url("operations");
        let mut operations = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("filter", filter)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self.request(Method::GET, &url).query(&query).send().await?;
            let page: OperationList = self.handle_response(response).await?;
            operations.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(operations)
    }

    /// Check whether the provider recorded a preemption of an instance
    ///
    /// # Arguments
    /// * `self_link` - The instance's self link, as returned by `instances.get`
    pub async fn was_preempted(&self, self_link: &str) -> Result<bool> {
        let operations = self.list_operations(&preemption_filter(self_link)).await?;
        Ok(operations.iter().any(|op| is_preemption_of(op, self_link)))
    }
}

/// The filter is evaluated server-side; the match is checked again here
fn is_preemption_of(operation: &Operation, self_link: &str) -> bool {
    operation.operation_type.as_deref() == Some(PREEMPTED_OPERATION_TYPE)
        && operation.target_link.as_deref() == Some(self_link)
}

fn preemption_filter(self_link: &str) -> String {
    format!(
        "(operationType = \"{}\") AND (targetLink = \"{}\")",
        PREEMPTED_OPERATION_TYPE, self_link
    )
}

/// Turn a finished operation into an error if it recorded one
///
/// Capacity exhaustion is mapped to its own variant so callers can report it
/// distinctly from other rejections.
pub(crate) fn check_operation(operation: Operation) -> Result<Operation> {
    let errors = operation
        .error
        .as_ref()
        .map(|error| error.errors.clone())
        .unwrap_or_default();
    if errors.is_empty() {
        return Ok(operation);
    }

    match errors.as_slice() {
        [single] if single.code == RESOURCE_POOL_EXHAUSTED => {
            Err(ComputeError::ResourcesExhausted(single.message.clone()))
        }
        [single] => Err(ComputeError::OperationFailed {
            operation: operation.name.clone(),
            code: single.code.clone(),
            message: single.message.clone(),
        }),
        many => Err(ComputeError::OperationFailed {
            operation: operation.name.clone(),
            code: many
                .iter()
                .map(|e| e.code.as_str())
                .collect::<Vec<_>>()
                .join(","),
            message: many
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        }),
    }
}
