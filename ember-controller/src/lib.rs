//! Ember Controller
//!
//! Runs containerized jobs on preemptible Compute Engine instances, one
//! instance per job.
//!
//! Architecture:
//! - Configuration: Load settings from environment, with defaults
//! - Repositories: Compute Engine access behind a trait (instances, markers)
//! - Services: Provisioner, lifecycle monitor and teardown handler
//! - Scheduler: Per-job lifecycle, concurrent dispatch and the job registry
//!
//! Each job is provisioned, watched until its container publishes an exit
//! code (or the instance is preempted, times out or is cancelled), and its
//! instance is deleted before the outcome is handed back.

pub mod config;
pub mod error;
pub mod repository;
mod retry;
pub mod scheduler;
pub mod service;

pub use config::{Config, ConfigError, TaskProfile};
pub use error::{MonitorError, ProvisionError, TeardownError};
pub use repository::{GceInstanceRepository, InstanceRepository};
pub use scheduler::{Dispatcher, JobHandle, JobRegistry};
