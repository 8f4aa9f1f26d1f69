//! Job submission DTOs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus, TaskKind};

/// Request to run one payload on a fresh instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    pub kind: TaskKind,
    pub input_uri: String,
    pub output_uri: String,
    #[serde(default)]
    pub rallies_uri: Option<String>,
    pub docker_image: String,
}

/// Rejected submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input_uri must not be empty")]
    EmptyInputUri,

    #[error("output_uri must not be empty")]
    EmptyOutputUri,

    #[error("docker image '{0}' must include a tag or digest")]
    UntaggedImage(String),

    #[error("docker image reference '{0}' is malformed")]
    MalformedImage(String),

    #[error("rallies_uri is only accepted for analysis jobs")]
    RalliesOnExport,
}

impl SubmitJob {
    /// Creates the pending job record, assigning a fresh id
    pub fn into_job(self) -> Job {
        Job {
            id: Uuid::new_v4(),
            kind: self.kind,
            input_uri: self.input_uri,
            output_uri: self.output_uri,
            rallies_uri: self.rallies_uri.filter(|uri| !uri.is_empty()),
            docker_image: self.docker_image,
            status: JobStatus::Pending,
            exit_code: None,
            failure: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Checks a job against the payload contract
pub fn validate_job(job: &Job) -> Result<(), ValidationError> {
    if job.input_uri.trim().is_empty() {
        return Err(ValidationError::EmptyInputUri);
    }
    if job.output_uri.trim().is_empty() {
        return Err(ValidationError::EmptyOutputUri);
    }
    if job.kind == TaskKind::Export && job.rallies_uri.is_some() {
        return Err(ValidationError::RalliesOnExport);
    }
    validate_image_reference(&job.docker_image)
}

/// Checks that an image reference names a tag or a digest
///
/// Accepts `repo:tag`, `registry:port/repo:tag` and `repo@sha256:...`.
pub fn validate_image_reference(image: &str) -> Result<(), ValidationError> {
    let image = image.trim();
    if image.is_empty() || image.chars().any(char::is_whitespace) {
        return Err(ValidationError::MalformedImage(image.to_string()));
    }

    if let Some((repo, digest)) = image.split_once('@') {
        if repo.is_empty() || !digest.contains(':') {
            return Err(ValidationError::MalformedImage(image.to_string()));
        }
        return Ok(());
    }

    // The tag separator is the last ':' after the last '/', so that a
    // registry port is not mistaken for a tag.
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    match last_segment.split_once(':') {
        Some((name, tag)) if !name.is_empty() && !tag.is_empty() => Ok(()),
        Some(_) => Err(ValidationError::MalformedImage(image.to_string())),
        None => Err(ValidationError::UntaggedImage(image.to_string())),
    }
}
