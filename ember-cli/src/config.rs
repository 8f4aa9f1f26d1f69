//! Configuration module
//!
//! Builds the controller configuration from the environment, with
//! command-line flags taking precedence.

use anyhow::{Context, Result};
use ember_controller::Config;
use std::time::Duration;

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project: Option<String>,
    pub zone: Option<String>,
    /// Job timeout in seconds
    pub job_timeout: Option<u64>,
}

/// Loads and validates the configuration
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    load_with(overrides, |key| std::env::var(key).ok())
}

fn load_with<F>(overrides: &Overrides, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::from_lookup(|key: &str| match key {
        "EMBER_PROJECT_ID" if overrides.project.is_some() => overrides.project.clone(),
        "EMBER_ZONE" if overrides.zone.is_some() => overrides.zone.clone(),
        _ => env(key),
    })
    .context("Failed to load configuration (set EMBER_PROJECT_ID or pass --project)")?;

    if let Some(secs) = overrides.job_timeout {
        config.job_timeout = Duration::from_secs(secs);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
