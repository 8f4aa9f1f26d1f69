//! Core domain types
//!
//! This module contains the core domain structures used across Ember crates.
//! A Job is the unit of work requested by a caller; an Instance is the single
//! preemptible VM bound to it for its lifetime.

pub mod instance;
pub mod job;
pub mod outcome;
