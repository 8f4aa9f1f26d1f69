//! Instance domain model
//!
//! Represents the single preemptible VM a job runs on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every instance name managed by Ember
pub const INSTANCE_NAME_PREFIX: &str = "ember-";

/// A preemptible VM bound to exactly one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Derived from the job id, see [`Instance::name_for`]
    pub name: String,

    pub job_id: Uuid,

    pub zone: String,

    pub machine_type: String,

    /// Image family the boot disk was resolved from
    pub image_family: String,

    /// When the provider acknowledged creation
    pub created_at: DateTime<Utc>,

    /// When deletion was acknowledged, `None` while the VM may still exist
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Deterministic instance name for a job
    ///
    /// Compute Engine names must start with a lowercase letter and contain at
    /// most 63 lowercase letters, digits and dashes.
    pub fn name_for(job_id: Uuid) -> String {
        format!("{}{}", INSTANCE_NAME_PREFIX, job_id.simple())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
