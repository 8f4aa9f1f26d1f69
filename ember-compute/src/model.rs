//! Compute Engine resource representations
//!
//! Only the fields the controller reads are modelled; unknown fields are
//! ignored on deserialization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provider-side lifecycle status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Repairing,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Whether the VM is on its way up or up
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Provisioning | Self::Staging | Self::Running | Self::Repairing
        )
    }
}

/// An instance as returned by `instances.get` and `instances.list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResource {
    pub name: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
    #[serde(default)]
    pub scheduling: Option<SchedulingResource>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl InstanceResource {
    pub fn is_preemptible(&self) -> bool {
        self.scheduling
            .as_ref()
            .and_then(|s| s.preemptible)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingResource {
    #[serde(default)]
    pub preemptible: Option<bool>,
}

/// One page of `instances.list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceList {
    #[serde(default)]
    pub items: Vec<InstanceResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Long-running zone operation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub status: OperationStatus,
    #[serde(default)]
    pub operation_type: Option<String>,
    #[serde(default)]
    pub target_link: Option<String>,
    #[serde(default)]
    pub error: Option<OperationErrors>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrors {
    #[serde(default)]
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One page of `zoneOperations.list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationList {
    #[serde(default)]
    pub items: Vec<Operation>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Boot image resolved from a family
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,
    pub self_link: String,
}

/// Response of `instances.getGuestAttributes` for a single key
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAttribute {
    #[serde(default)]
    pub variable_key: String,
    #[serde(default)]
    pub variable_value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instance() {
        let json = r#"{
            "name": "ember-abc",
            "status": "TERMINATED",
            "selfLink": "https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/ember-abc",
            "scheduling": {"preemptible": true, "automaticRestart": false},
            "labels": {"ember-managed": "true"},
            "networkInterfaces": []
        }"#;
        let instance: InstanceResource = serde_json::from_str(json).unwrap();
        assert_eq!(instance.status, InstanceStatus::Terminated);
        assert!(instance.is_preemptible());
        assert!(!instance.status.is_active());
        assert_eq!(instance.labels.get("ember-managed").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let instance: InstanceResource =
            serde_json::from_str(r#"{"name": "x", "status": "PENDING_STOP"}"#).unwrap();
        assert_eq!(instance.status, InstanceStatus::Unknown);
        assert!(!instance.is_preemptible());
    }

    #[test]
    fn test_parse_failed_operation() {
        let json = r#"{
            "name": "operation-1",
            "status": "DONE",
            "error": {"errors": [{"code": "ZONE_RESOURCE_POOL_EXHAUSTED", "message": "no capacity"}]}
        }"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert_eq!(op.status, OperationStatus::Done);
        let errors = op.error.unwrap().errors;
        assert_eq!(errors[0].code, "ZONE_RESOURCE_POOL_EXHAUSTED");
    }

    #[test]
    fn test_empty_list_has_no_items() {
        let list: InstanceList = serde_json::from_str(r#"{"kind": "compute#instanceList"}"#).unwrap();
        assert!(list.items.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
