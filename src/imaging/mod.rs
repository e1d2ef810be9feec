//! DICOM instance retrieval from the imaging server.
//!
//! # Design Decisions
//! - Instances are fetched whole and returned as one body; no streaming
//! - Any non-success upstream status is reported as "not found"
//! - Identifiers are appended as encoded path segments, never spliced into
//!   the URL text

use std::time::Duration;

use axum::body::Bytes;
use thiserror::Error;

use crate::config::ImagingConfig;

/// Imaging server failures.
#[derive(Debug, Error)]
pub enum ImagingError {
    /// The configured server URL is unusable.
    #[error("invalid imaging configuration: {0}")]
    Config(String),

    /// The request could not be sent or its body read.
    #[error("imaging request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the imaging server's instance file endpoint.
#[derive(Clone)]
pub struct ImagingClient {
    http: reqwest::Client,
    base_url: url::Url,
    username: String,
    password: String,
}

impl ImagingClient {
    /// Build a client, or `None` when no imaging server is configured.
    pub fn from_config(
        config: &ImagingConfig,
        timeout: Duration,
    ) -> Result<Option<Self>, ImagingError> {
        let Some(raw) = config.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let base_url = url::Url::parse(raw.trim())
            .map_err(|e| ImagingError::Config(format!("'{}': {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ImagingError::Config(format!("'{}' cannot carry a path", raw)));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Some(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        }))
    }

    /// Upstream URL of an instance file.
    pub fn instance_url(&self, study: &str, series: &str, instance: &str) -> url::Url {
        let mut url = self.base_url.clone();
        // Checked in from_config: the base always accepts path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "studies", study, "series", series, "instances", instance, "file",
            ]);
        }
        url
    }

    /// Fetch an instance file. `Ok(None)` when the server does not return it.
    pub async fn fetch_instance(
        &self,
        study: &str,
        series: &str,
        instance: &str,
    ) -> Result<Option<Bytes>, ImagingError> {
        let response = self
            .http
            .get(self.instance_url(study, series, instance))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(status = response.status().as_u16(), "Imaging server rejected instance request");
            return Ok(None);
        }
        Ok(Some(response.bytes().await?))
    }
}

impl std::fmt::Debug for ImagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagingClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
