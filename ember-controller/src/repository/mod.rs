//! Repository layer
//!
//! Repositories are thin async wrappers over the Compute Engine client.
//! They translate provider resources into the handful of facts the
//! lifecycle needs and carry no business logic.
//!
//! The trait seam lets the lifecycle run against an in-memory fake in tests.

mod instances;

#[cfg(test)]
pub mod fake;

pub use instances::{
    DeleteAck, GceInstanceRepository, InstanceRepository, ProviderState, managed_instances_filter,
};
