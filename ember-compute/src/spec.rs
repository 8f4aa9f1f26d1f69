//! Instance creation body
//!
//! The builder holds a zone-independent template; [`InstanceSpecBuilder::build`]
//! finalizes it for a project and zone into the JSON body of `instances.insert`.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// OAuth scopes granted to the instance's default service account
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/devstorage.read_write",
    "https://www.googleapis.com/auth/logging.write",
    "https://www.googleapis.com/auth/datastore",
    "https://www.googleapis.com/auth/monitoring.write",
    "https://www.googleapis.com/auth/service.management.readonly",
    "https://www.googleapis.com/auth/servicecontrol",
    "https://www.googleapis.com/auth/trace.append",
];

/// A GPU/TPU request, e.g. `nvidia-tesla-t4` x 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accelerator {
    pub accelerator_type: String,
    pub count: u32,
}

impl Accelerator {
    pub fn new(accelerator_type: impl Into<String>, count: u32) -> Self {
        Self {
            accelerator_type: accelerator_type.into(),
            count,
        }
    }
}

/// Zone-independent instance template
#[derive(Debug, Clone)]
pub struct InstanceSpecBuilder {
    name: String,
    source_image: String,
    machine_type: String,
    preemptible: bool,
    boot_disk_gb: u32,
    accelerators: Vec<Accelerator>,
    metadata: Vec<(String, String)>,
    labels: BTreeMap<String, String>,
}

impl InstanceSpecBuilder {
    /// Creates a preemptible template with a 50 GB boot disk
    ///
    /// # Arguments
    /// * `name` - Instance name
    /// * `source_image` - Self link of the boot image
    /// * `machine_type` - Machine type name (e.g. "n1-standard-4")
    pub fn new(
        name: impl Into<String>,
        source_image: impl Into<String>,
        machine_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_image: source_image.into(),
            machine_type: machine_type.into(),
            preemptible: true,
            boot_disk_gb: 50,
            accelerators: Vec::new(),
            metadata: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn preemptible(mut self, preemptible: bool) -> Self {
        self.preemptible = preemptible;
        self
    }

    pub fn boot_disk_gb(mut self, size: u32) -> Self {
        self.boot_disk_gb = size;
        self
    }

    pub fn accelerator(mut self, accelerator: Accelerator) -> Self {
        self.accelerators.push(accelerator);
        self
    }

    /// Adds a metadata item; a later value for the same key wins
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.metadata.retain(|(k, _)| *k != key);
        self.metadata.push((key, value.into()));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finalizes the template for a project and zone
    pub fn build(&self, project: &str, zone: &str) -> InstanceSpec {
        debug!(
            "Building instance {} with machine_type={}, preemptible={}, accelerators={:?}",
            self.name, self.machine_type, self.preemptible, self.accelerators
        );

        let guest_accelerators = self
            .accelerators
            .iter()
            .map(|acc| GuestAccelerator {
                accelerator_count: acc.count,
                accelerator_type: format!(
                    "projects/{}/zones/{}/acceleratorTypes/{}",
                    project, zone, acc.accelerator_type
                ),
            })
            .collect();

        InstanceSpec {
            name: self.name.clone(),
            machine_type: format!("zones/{}/machineTypes/{}", zone, self.machine_type),
            scheduling: Scheduling {
                preemptible: self.preemptible,
                on_host_maintenance: "TERMINATE".to_string(),
                automatic_restart: false,
            },
            disks: vec![AttachedDisk {
                boot: true,
                auto_delete: true,
                initialize_params: DiskParams {
                    source_image: self.source_image.clone(),
                    disk_size_gb: self.boot_disk_gb.to_string(),
                },
            }],
            network_interfaces: vec![NetworkInterface {
                network: "global/networks/default".to_string(),
                access_configs: vec![AccessConfig {
                    kind: "ONE_TO_ONE_NAT".to_string(),
                    name: "External NAT".to_string(),
                }],
            }],
            guest_accelerators,
            service_accounts: vec![ServiceAccount {
                email: "default".to_string(),
                scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            }],
            metadata: Metadata {
                items: self
                    .metadata
                    .iter()
                    .map(|(key, value)| MetadataItem {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            },
            labels: self.labels.clone(),
        }
    }
}

/// JSON body of `instances.insert`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub name: String,
    pub machine_type: String,
    pub scheduling: Scheduling,
    pub disks: Vec<AttachedDisk>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub guest_accelerators: Vec<GuestAccelerator>,
    pub service_accounts: Vec<ServiceAccount>,
    pub metadata: Metadata,
    pub labels: BTreeMap<String, String>,
}

impl InstanceSpec {
    /// Looks up a metadata value by key
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduling {
    pub preemptible: bool,
    pub on_host_maintenance: String,
    pub automatic_restart: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    pub boot: bool,
    pub auto_delete: bool,
    pub initialize_params: DiskParams,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskParams {
    pub source_image: String,
    pub disk_size_gb: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub network: String,
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAccelerator {
    pub accelerator_count: u32,
    pub accelerator_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceAccount {
    pub email: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_preemptible_body() {
        let spec = InstanceSpecBuilder::new("ember-1", "projects/p/global/images/img", "n1-standard-4")
            .metadata("docker_image", "gcr.io/p/a:1")
            .label("ember-managed", "true")
            .build("my-project", "us-east1-c");

        let body = serde_json::to_value(&spec).unwrap();
        assert_eq!(body["machineType"], "zones/us-east1-c/machineTypes/n1-standard-4");
        assert_eq!(
            body["scheduling"],
            json!({"preemptible": true, "onHostMaintenance": "TERMINATE", "automaticRestart": false})
        );
        assert_eq!(body["disks"][0]["initializeParams"]["diskSizeGb"], "50");
        assert_eq!(body["disks"][0]["autoDelete"], true);
        assert_eq!(body["networkInterfaces"][0]["accessConfigs"][0]["type"], "ONE_TO_ONE_NAT");
        assert_eq!(body["labels"]["ember-managed"], "true");
        assert_eq!(body["guestAccelerators"], json!([]));
        assert_eq!(spec.metadata_value("docker_image"), Some("gcr.io/p/a:1"));
    }

    #[test]
    fn test_accelerator_type_is_zone_qualified() {
        let spec = InstanceSpecBuilder::new("ember-2", "img", "n1-standard-8")
            .accelerator(Accelerator::new("nvidia-tesla-t4", 2))
            .build("proj", "europe-west4-a");

        assert_eq!(spec.guest_accelerators.len(), 1);
        assert_eq!(spec.guest_accelerators[0].accelerator_count, 2);
        assert_eq!(
            spec.guest_accelerators[0].accelerator_type,
            "projects/proj/zones/europe-west4-a/acceleratorTypes/nvidia-tesla-t4"
        );
    }

    #[test]
    fn test_metadata_last_value_wins() {
        let spec = InstanceSpecBuilder::new("ember-3", "img", "e2-small")
            .metadata("gpu", "false")
            .metadata("gpu", "true")
            .build("p", "z");

        assert_eq!(spec.metadata.items.len(), 1);
        assert_eq!(spec.metadata_value("gpu"), Some("true"));
    }
}
