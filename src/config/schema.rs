//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the portal.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the patient portal.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PortalConfig {
    /// Listener configuration (bind address, public URL).
    pub listener: ListenerConfig,

    /// Remote data platform (REST, RPC and storage).
    pub backend: BackendConfig,

    /// Imaging server used for DICOM pass-through.
    pub imaging: ImagingConfig,

    /// Access attempt limiting.
    pub rate_limit: RateLimitConfig,

    /// Share link settings.
    pub share_links: ShareLinkConfig,

    /// Study file upload limits.
    pub uploads: UploadConfig,

    /// Audit log listing and export.
    pub audit: AuditConfig,

    /// Staff API authentication.
    pub staff: StaffConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Public base URL used to build share links.
    pub public_base_url: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Remote data platform configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the platform (e.g., "https://xyz.supabase.co").
    pub url: String,

    /// Service role key sent as `apikey` and bearer token.
    pub service_key: String,

    /// Storage bucket holding study files.
    pub storage_bucket: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            service_key: String::new(),
            storage_bucket: "estudios".to_string(),
        }
    }
}

/// Imaging (DICOM) server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ImagingConfig {
    /// Base URL of the imaging server. Pass-through is disabled when unset.
    pub url: Option<String>,

    /// Basic auth user.
    pub username: String,

    /// Basic auth password.
    pub password: String,
}

/// Rate limiting configuration for access validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Attempts allowed per window and client.
    pub max_attempts: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Interval between sweeps of expired entries, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_secs: 15 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Share link configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShareLinkConfig {
    /// Shortest allowed link lifetime in hours.
    pub min_hours: u32,

    /// Longest allowed link lifetime in hours.
    pub max_hours: u32,

    /// Lifetime used when the request does not specify one.
    pub default_hours: u32,

    /// Lifetime of signed download URLs in minutes.
    pub download_url_minutes: u32,
}

impl Default for ShareLinkConfig {
    fn default() -> Self {
        Self {
            min_hours: 24,
            max_hours: 72,
            default_hours: 48,
            download_url_minutes: 10,
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum file size in bytes.
    pub max_file_bytes: usize,

    /// Accepted MIME types.
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * 1024 * 1024, // 50MB
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/zip".to_string(),
            ],
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum rows in a CSV export.
    pub export_row_cap: usize,

    /// Largest page size accepted by the listing endpoint.
    pub max_page_size: u32,

    /// UTC offset, in minutes, used to render dates in exports.
    pub export_utc_offset_minutes: i32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            export_row_cap: 10_000,
            max_page_size: 500,
            export_utc_offset_minutes: -180, // Argentina
        }
    }
}

/// Staff API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StaffConfig {
    /// API key for authentication (Bearer token). No default: startup
    /// fails until one is configured.
    pub api_key: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request timeout in seconds.
    pub request_secs: u64,

    /// Outbound call timeout (platform and imaging server) in seconds.
    pub backend_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            backend_secs: 15,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
