//! Ember Core
//!
//! Core types and abstractions for the Ember VM job controller.
//!
//! This crate contains:
//! - Domain types: Job, Instance and the terminal outcome of a job
//! - DTOs: job submission requests and the instance metadata contract

pub mod domain;
pub mod dto;
