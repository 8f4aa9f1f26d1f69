//! Scheduler layer
//!
//! Runs submitted jobs as independent tasks and drives each one through
//! its lifecycle. Also keeps the process-wide registry used for reporting.

pub mod dispatcher;
pub mod lifecycle;
pub mod registry;

pub use dispatcher::{Dispatcher, JobHandle};
pub use lifecycle::{InstanceLease, JobLifecycle};
pub use registry::{JobRegistry, RegistrySummary};
