//! Instance metadata contract
//!
//! Keys the controller writes into instance metadata and that the startup
//! script reads back through the metadata server, plus the guest attribute
//! the script writes when the container exits.

pub const DOCKER_IMAGE: &str = "docker_image";
pub const INPUT_URI: &str = "input_uri";
pub const OUTPUT_URI: &str = "output_uri";
pub const RALLIES_URI: &str = "rallies_uri";
pub const TASK_KIND: &str = "task_kind";
pub const JOB_ID: &str = "job_id";
/// Project the job runs in, forwarded to the container as `PROJECT_ID`
pub const PROJECT_ID: &str = "project_id";
/// "true" when the container should get `--gpus all`
pub const GPU: &str = "gpu";

pub const STARTUP_SCRIPT: &str = "startup-script";
pub const SERIAL_PORT_ENABLE: &str = "serial-port-enable";
pub const ENABLE_OSLOGIN: &str = "enable-oslogin";
pub const ENABLE_GUEST_ATTRIBUTES: &str = "enable-guest-attributes";

/// Guest attribute namespace used by the startup script
pub const MARKER_NAMESPACE: &str = "ember";
/// Guest attribute key holding the container exit code
pub const MARKER_KEY: &str = "exit-code";

/// Full `namespace/key` path of the completion marker
pub fn marker_path() -> String {
    format!("{}/{}", MARKER_NAMESPACE, MARKER_KEY)
}

/// Label present on every instance created by the controller
pub const MANAGED_LABEL: &str = "ember-managed";
/// Label carrying the job id of the instance
pub const JOB_LABEL: &str = "ember-job";
