//! Service layer
//!
//! Services hold the business logic of the three lifecycle stages. They
//! talk to the provider only through the repository trait so that they can
//! be driven by an in-memory fake in tests.

mod monitor;
mod provisioner;
mod teardown;

pub use monitor::LifecycleMonitor;
pub use provisioner::{InstanceProvisioner, STARTUP_SCRIPT};
pub use teardown::TeardownHandler;

use std::time::Duration;
use tokio::time::Instant;

/// Deadline `timeout` from now, saturating far in the future
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 30))
}
