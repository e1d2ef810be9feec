//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, hour bounds ordered)
//! - Validate URLs and socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PortalConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::PortalConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a loaded configuration for semantic errors.
pub fn validate_config(config: &PortalConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    check_url(&mut errors, "listener.public_base_url", &config.listener.public_base_url);
    check_url(&mut errors, "backend.url", &config.backend.url);

    if config.backend.storage_bucket.trim().is_empty() {
        errors.push(ValidationError::new("backend.storage_bucket", "must not be empty"));
    }

    if let Some(url) = &config.imaging.url {
        check_url(&mut errors, "imaging.url", url);
    }

    let rl = &config.rate_limit;
    if rl.max_attempts == 0 {
        errors.push(ValidationError::new("rate_limit.max_attempts", "must be at least 1"));
    }
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }

    let sl = &config.share_links;
    if sl.min_hours == 0 || sl.min_hours > sl.max_hours {
        errors.push(ValidationError::new(
            "share_links.min_hours",
            format!("must be in 1..={}", sl.max_hours),
        ));
    }
    if sl.default_hours < sl.min_hours || sl.default_hours > sl.max_hours {
        errors.push(ValidationError::new(
            "share_links.default_hours",
            format!("must be within {}..={}", sl.min_hours, sl.max_hours),
        ));
    }
    if sl.download_url_minutes == 0 {
        errors.push(ValidationError::new(
            "share_links.download_url_minutes",
            "must be greater than 0",
        ));
    }

    if config.uploads.max_file_bytes == 0 {
        errors.push(ValidationError::new("uploads.max_file_bytes", "must be greater than 0"));
    }
    if config.uploads.allowed_mime_types.is_empty() {
        errors.push(ValidationError::new(
            "uploads.allowed_mime_types",
            "at least one type is required",
        ));
    }

    if config.audit.export_row_cap == 0 {
        errors.push(ValidationError::new("audit.export_row_cap", "must be greater than 0"));
    }
    if config.audit.max_page_size == 0 {
        errors.push(ValidationError::new("audit.max_page_size", "must be greater than 0"));
    }
    if config.audit.export_utc_offset_minutes.abs() >= 24 * 60 {
        errors.push(ValidationError::new(
            "audit.export_utc_offset_minutes",
            "must be less than a day in magnitude",
        ));
    }

    if config.staff.api_key.trim().is_empty() {
        errors.push(ValidationError::new("staff.api_key", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.backend_secs == 0 {
        errors.push(ValidationError::new("timeouts.backend_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}
