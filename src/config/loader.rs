//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::PortalConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<PortalConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => PortalConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay deployment settings taken from the environment.
///
/// `lookup` resolves a variable name to its value, if set.
pub fn apply_env_overrides<F>(config: &mut PortalConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PORTAL_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("PUBLIC_BASE_URL") {
        config.listener.public_base_url = v;
    }
    if let Some(v) = lookup("SUPABASE_URL") {
        config.backend.url = v;
    }
    if let Some(v) = lookup("SUPABASE_SERVICE_ROLE_KEY") {
        config.backend.service_key = v;
    }
    if let Some(v) = lookup("DICOM_SERVER_URL") {
        config.imaging.url = Some(v);
    }
    if let Some(v) = lookup("DICOM_USER") {
        config.imaging.username = v;
    }
    if let Some(v) = lookup("DICOM_PASSWORD") {
        config.imaging.password = v;
    }
    if let Some(v) = lookup("STAFF_API_KEY") {
        config.staff.api_key = v;
    }
}
