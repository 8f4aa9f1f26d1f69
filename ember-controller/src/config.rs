//! Controller configuration
//!
//! Defines all configurable parameters for the controller: which project and
//! zone instances are created in, how each task kind is provisioned, and the
//! polling and timeout budgets of the lifecycle.
//!
//! Environment reads happen only in [`Config::from_env`]; every other part of
//! the controller receives the resulting values explicitly.

use ember_compute::Accelerator;
use ember_core::domain::job::TaskKind;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Validation(String),
}

/// How instances for one task kind are shaped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProfile {
    pub machine_type: String,
    pub accelerators: Vec<Accelerator>,
    /// Whether the container is started with access to the host GPUs
    pub gpu: bool,
}

impl TaskProfile {
    pub fn cpu(machine_type: impl Into<String>) -> Self {
        Self {
            machine_type: machine_type.into(),
            accelerators: Vec::new(),
            gpu: false,
        }
    }

    pub fn with_accelerator(mut self, accelerator: Accelerator) -> Self {
        self.accelerators.push(accelerator);
        self.gpu = true;
        self
    }
}

/// Controller configuration
///
/// All timeouts and intervals are configurable to allow tuning for
/// different workloads (short exports vs long GPU analyses).
#[derive(Debug, Clone)]
pub struct Config {
    /// Cloud project instances are created in
    pub project_id: String,

    /// Zone instances are created in
    pub zone: String,

    /// Project owning the boot image family
    pub image_project: String,

    /// Boot image family (must have docker installed)
    pub image_family: String,

    /// Boot disk size in GB
    pub boot_disk_gb: u32,

    /// Request preemptible instances; turned off when debugging a payload
    pub preemptible: bool,

    pub analysis: TaskProfile,

    pub export: TaskProfile,

    /// How often the monitor polls instance state
    pub poll_interval: Duration,

    /// Maximum time a job may run before it is failed with a timeout
    pub job_timeout: Duration,

    /// Bound on a single provisioning or teardown API exchange
    pub operation_timeout: Duration,

    /// Transient failures tolerated per poll before the monitor gives up
    pub poll_retry_budget: u32,

    /// Max jobs whose lifecycle runs at the same time
    pub max_parallel_jobs: usize,

    /// Hard limit on managed instances existing in the zone
    pub max_instances: usize,

    /// Compute Engine API base URL
    pub compute_url: String,

    /// OAuth access token for the Compute Engine API
    pub access_token: Option<String>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(project_id: String) -> Self {
        Self {
            image_project: project_id.clone(),
            project_id,
            zone: "us-east1-c".to_string(),
            image_family: "ember-worker".to_string(),
            boot_disk_gb: 50,
            preemptible: true,
            analysis: TaskProfile::cpu("n1-standard-4")
                .with_accelerator(Accelerator::new("nvidia-tesla-t4", 1)),
            export: TaskProfile::cpu("n1-standard-4"),
            poll_interval: Duration::from_secs(15),
            job_timeout: Duration::from_secs(6 * 60 * 60),
            operation_timeout: Duration::from_secs(120),
            poll_retry_budget: 3,
            max_parallel_jobs: 4,
            max_instances: 10,
            compute_url: ember_compute::DEFAULT_BASE_URL.to_string(),
            access_token: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - EMBER_PROJECT_ID (required, falls back to GOOGLE_CLOUD_PROJECT)
    /// - EMBER_ZONE (optional, default: us-east1-c)
    /// - EMBER_IMAGE_PROJECT (optional, default: the project id)
    /// - EMBER_IMAGE_FAMILY (optional, default: ember-worker)
    /// - EMBER_BOOT_DISK_GB (optional, default: 50)
    /// - EMBER_PREEMPTIBLE (optional, default: true)
    /// - EMBER_ANALYSIS_MACHINE_TYPE / EMBER_EXPORT_MACHINE_TYPE (optional, default: n1-standard-4)
    /// - EMBER_ANALYSIS_ACCELERATOR / EMBER_EXPORT_ACCELERATOR (optional, `type:count` or `none`)
    /// - EMBER_POLL_INTERVAL (optional, seconds, default: 15)
    /// - EMBER_JOB_TIMEOUT (optional, seconds, default: 21600)
    /// - EMBER_OPERATION_TIMEOUT (optional, seconds, default: 120)
    /// - EMBER_POLL_RETRIES (optional, default: 3)
    /// - EMBER_MAX_PARALLEL_JOBS (optional, default: 4)
    /// - EMBER_MAX_INSTANCES (optional, default: 10)
    /// - EMBER_COMPUTE_URL (optional)
    /// - EMBER_ACCESS_TOKEN (optional, falls back to GOOGLE_OAUTH_ACCESS_TOKEN)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_id = lookup("EMBER_PROJECT_ID")
            .or_else(|| lookup("GOOGLE_CLOUD_PROJECT"))
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::Missing("EMBER_PROJECT_ID"))?;

        let mut config = Self::new(project_id);

        if let Some(zone) = lookup("EMBER_ZONE") {
            config.zone = zone;
        }
        if let Some(image_project) = lookup("EMBER_IMAGE_PROJECT") {
            config.image_project = image_project;
        }
        if let Some(image_family) = lookup("EMBER_IMAGE_FAMILY") {
            config.image_family = image_family;
        }
        if let Some(size) = parse_var(&lookup, "EMBER_BOOT_DISK_GB")? {
            config.boot_disk_gb = size;
        }
        if let Some(preemptible) = parse_var(&lookup, "EMBER_PREEMPTIBLE")? {
            config.preemptible = preemptible;
        }

        if let Some(machine_type) = lookup("EMBER_ANALYSIS_MACHINE_TYPE") {
            config.analysis.machine_type = machine_type;
        }
        if let Some(spec) = lookup("EMBER_ANALYSIS_ACCELERATOR") {
            config.analysis = apply_accelerator(config.analysis, "EMBER_ANALYSIS_ACCELERATOR", &spec)?;
        }
        if let Some(machine_type) = lookup("EMBER_EXPORT_MACHINE_TYPE") {
            config.export.machine_type = machine_type;
        }
        if let Some(spec) = lookup("EMBER_EXPORT_ACCELERATOR") {
            config.export = apply_accelerator(config.export, "EMBER_EXPORT_ACCELERATOR", &spec)?;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "EMBER_POLL_INTERVAL")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "EMBER_JOB_TIMEOUT")? {
            config.job_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "EMBER_OPERATION_TIMEOUT")? {
            config.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var(&lookup, "EMBER_POLL_RETRIES")? {
            config.poll_retry_budget = retries;
        }
        if let Some(parallel) = parse_var(&lookup, "EMBER_MAX_PARALLEL_JOBS")? {
            config.max_parallel_jobs = parallel;
        }
        if let Some(limit) = parse_var(&lookup, "EMBER_MAX_INSTANCES")? {
            config.max_instances = limit;
        }
        if let Some(url) = lookup("EMBER_COMPUTE_URL") {
            config.compute_url = url;
        }
        config.access_token = lookup("EMBER_ACCESS_TOKEN")
            .or_else(|| lookup("GOOGLE_OAUTH_ACCESS_TOKEN"))
            .filter(|t| !t.is_empty());

        Ok(config)
    }

    /// Returns the provisioning profile of a task kind
    pub fn profile(&self, kind: TaskKind) -> &TaskProfile {
        match kind {
            TaskKind::Analysis => &self.analysis,
            TaskKind::Export => &self.export,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

        if self.project_id.is_empty() {
            return fail("project_id cannot be empty");
        }

        if self.zone.is_empty() {
            return fail("zone cannot be empty");
        }

        if self.image_family.is_empty() {
            return fail("image_family cannot be empty");
        }

        if self.analysis.machine_type.is_empty() || self.export.machine_type.is_empty() {
            return fail("machine_type cannot be empty");
        }

        if self.poll_interval.is_zero() {
            return fail("poll_interval must be greater than 0");
        }

        if self.job_timeout < self.poll_interval {
            return fail("job_timeout must be at least one poll_interval");
        }

        if self.operation_timeout.is_zero() {
            return fail("operation_timeout must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            return fail("max_parallel_jobs must be greater than 0");
        }

        if self.max_instances == 0 {
            return fail("max_instances must be greater than 0");
        }

        if !self.compute_url.starts_with("http://") && !self.compute_url.starts_with("https://") {
            return fail("compute_url must start with http:// or https://");
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
    }
}

/// Parses `type:count` (count defaults to 1) or `none`
fn apply_accelerator(
    mut profile: TaskProfile,
    key: &'static str,
    spec: &str,
) -> Result<TaskProfile, ConfigError> {
    let spec = spec.trim();
    profile.accelerators.clear();
    profile.gpu = false;

    if spec.is_empty() || spec.eq_ignore_ascii_case("none") {
        return Ok(profile);
    }

    let (kind, count) = match spec.split_once(':') {
        Some((kind, count)) => {
            let count = count.parse::<u32>().map_err(|e| ConfigError::Invalid {
                key,
                value: spec.to_string(),
                reason: e.to_string(),
            })?;
            (kind, count)
        }
        None => (spec, 1),
    };

    if kind.is_empty() || count == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: spec.to_string(),
            reason: "expected type:count with count > 0".to_string(),
        });
    }

    Ok(profile.with_accelerator(Accelerator::new(kind, count)))
}
