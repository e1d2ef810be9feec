//! Share link lifecycle.
//!
//! # State Machine
//! ```text
//! create ──▶ active ──(now > expira_en)──▶ expired
//!               │
//!               └──(revoke)──────────────▶ revoked
//! ```
//! Expired and revoked links never validate again. The state lives on the
//! data platform; this service checks inputs, delegates, and records what
//! happened.
//!
//! # Design Decisions
//! - Duration bounds are checked before any remote call
//! - Unknown, expired and revoked tokens produce the same response
//! - No caching of validation results: a revoke takes effect immediately

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::audit::{events, AuditLog};
use crate::backend::{Backend, ShareLinkSummary, StudyAccess};
use crate::config::ShareLinkConfig;
use crate::http::request::ClientInfo;
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::security::codes::hash_token;

/// Response message for tokens that do not resolve, whatever the reason.
pub const INVALID_LINK: &str = "Enlace inválido, expirado o revocado";

/// Reason stored when the caller gives none.
pub const DEFAULT_REVOKE_REASON: &str = "Revocado por el usuario";

/// Where a link stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareLinkState {
    Active,
    Expired,
    Revoked,
}

impl ShareLinkState {
    /// Revocation wins over expiry.
    pub fn of(link: &ShareLinkSummary, now: DateTime<Utc>) -> Self {
        if link.revocado {
            ShareLinkState::Revoked
        } else if now > link.expira_en {
            ShareLinkState::Expired
        } else {
            ShareLinkState::Active
        }
    }
}

/// A link as returned to its creator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedShareLink {
    pub id: String,
    pub token: String,
    pub expira_en: DateTime<Utc>,
    pub url: String,
}

/// Orchestrates share link creation, validation and revocation.
#[derive(Clone)]
pub struct ShareLinkService {
    backend: Arc<dyn Backend>,
    audit: AuditLog,
    config: ShareLinkConfig,
    public_base_url: String,
}

impl ShareLinkService {
    pub fn new(
        backend: Arc<dyn Backend>,
        audit: AuditLog,
        config: ShareLinkConfig,
        public_base_url: &str,
    ) -> Self {
        Self {
            backend,
            audit,
            config,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve the requested duration, applying the default and bounds.
    pub fn resolve_duration(&self, hours: Option<i64>) -> Result<u32, ApiError> {
        let hours = hours.unwrap_or(i64::from(self.config.default_hours));
        let bounds = i64::from(self.config.min_hours)..=i64::from(self.config.max_hours);
        if !bounds.contains(&hours) {
            return Err(ApiError::Validation(
                format!(
                    "La duración debe estar entre {} y {} horas",
                    self.config.min_hours, self.config.max_hours
                )
                .into(),
            ));
        }
        // In range of u32 by the check above.
        Ok(hours as u32)
    }

    /// Public URL under which a token is viewed.
    pub fn view_url(&self, token: &str) -> String {
        format!("{}/medical-view/{}", self.public_base_url, token)
    }

    /// Create a link for a study on behalf of a patient.
    pub async fn create(
        &self,
        study_id: &str,
        hours: Option<i64>,
        client: &ClientInfo,
    ) -> Result<CreatedShareLink, ApiError> {
        let hours = self.resolve_duration(hours)?;

        let record = self
            .backend
            .create_share_link(study_id, hours, true)
            .await
            .map_err(ApiError::backend("Error creando enlace de compartir"))?
            .ok_or_else(|| {
                metrics::record_share_link("create", "empty");
                ApiError::Internal("create_medical_share_link returned no row".into())
            })?;

        metrics::record_share_link("create", "ok");
        tracing::info!(
            study_id = %study_id,
            link_id = %record.id,
            hours,
            expires_at = %record.expira_en,
            "Share link created"
        );

        let mut event = AuditLog::event(
            events::CREATE_MEDICAL_SHARE,
            Some(client),
            json!({
                "token_hash": hash_token(&record.token),
                "expira_en": record.expira_en,
                "duracion_horas": hours,
            }),
        );
        event.estudio_id = Some(study_id.to_string());
        self.audit.record(event).await;

        Ok(CreatedShareLink {
            url: self.view_url(&record.token),
            id: record.id,
            token: record.token,
            expira_en: record.expira_en,
        })
    }

    /// Resolve a token to its study.
    pub async fn validate(&self, token: &str) -> Result<StudyAccess, ApiError> {
        let study = self
            .backend
            .validate_share_link(token)
            .await
            .map_err(ApiError::backend("Error validando enlace"))?;

        match study {
            Some(study) => {
                metrics::record_share_link("validate", "ok");
                Ok(study)
            }
            None => {
                metrics::record_share_link("validate", "rejected");
                Err(ApiError::NotFound(INVALID_LINK))
            }
        }
    }

    /// Revoke a link.
    pub async fn revoke(
        &self,
        token: &str,
        reason: Option<&str>,
        client: &ClientInfo,
    ) -> Result<(), ApiError> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REVOKE_REASON);

        let revoked = self
            .backend
            .revoke_share_link(token, reason)
            .await
            .map_err(ApiError::backend("Error revocando enlace"))?;

        if !revoked {
            metrics::record_share_link("revoke", "not_found");
            return Err(ApiError::NotFound("Enlace no encontrado o ya revocado"));
        }

        metrics::record_share_link("revoke", "ok");
        tracing::info!("Share link revoked");
        self.audit
            .record(AuditLog::event(
                events::REVOKE_MEDICAL_SHARE,
                Some(client),
                json!({ "token_hash": hash_token(token), "motivo": reason }),
            ))
            .await;
        Ok(())
    }

    /// Signed download URL for a file, gated on a live share token.
    pub async fn download_url(
        &self,
        file_id: &str,
        token: &str,
        client: &ClientInfo,
    ) -> Result<String, ApiError> {
        // A failed lookup is answered like a dead token.
        let study = match self.backend.validate_share_link(token).await {
            Ok(study) => study,
            Err(e) => {
                tracing::error!(error = %e, "Share link lookup failed before download");
                None
            }
        };
        if study.is_none() {
            metrics::record_share_link("download", "rejected");
            return Err(ApiError::Unauthorized("Token inválido o expirado"));
        }

        let url = self
            .backend
            .generate_signed_url(file_id, self.config.download_url_minutes)
            .await
            .map_err(ApiError::backend("Error generando URL de descarga"))?
            .ok_or(ApiError::NotFound("Archivo no encontrado"))?;

        metrics::record_share_link("download", "ok");
        self.audit
            .record(AuditLog::event(
                events::MEDICAL_SHARE_DOWNLOAD,
                Some(client),
                json!({ "archivo_id": file_id, "token_hash": hash_token(token) }),
            ))
            .await;
        Ok(url)
    }

    /// Lifetime of signed download URLs, in seconds.
    pub fn download_url_ttl_secs(&self) -> u64 {
        u64::from(self.config.download_url_minutes) * 60
    }
}
