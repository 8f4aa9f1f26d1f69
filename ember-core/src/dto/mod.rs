//! Data Transfer Objects
//!
//! Requests accepted from callers and the key/value contract shared with
//! the startup script running on the instance.

pub mod job;
pub mod metadata;
