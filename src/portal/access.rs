//! Patient access by DNI and access code.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{events, AuditLog};
use crate::http::request::{non_empty, ApiJson, ClientInfo};
use crate::http::response::{ApiError, INTERNAL_ERROR};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::codes::hash_code;
use crate::security::validators::{validate_code, validate_dni};

use super::study_response;

#[derive(Debug, Deserialize)]
pub struct ValidateAccessRequest {
    #[serde(default)]
    pub dni: Option<String>,
    #[serde(default)]
    pub codigo: Option<String>,
}

/// `POST /api/validate-access`
///
/// Checks input shape first, then the per-IP attempt window, and only then
/// asks the data platform. Invalid input does not consume an attempt.
pub async fn validate_access(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(body): ApiJson<ValidateAccessRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(dni), Some(codigo)) = (non_empty(body.dni), non_empty(body.codigo)) else {
        return Err(ApiError::Validation("DNI y código son requeridos".into()));
    };
    if !validate_dni(&dni) {
        return Err(ApiError::Validation("DNI inválido".into()));
    }
    if !validate_code(&codigo) {
        return Err(ApiError::Validation("Código inválido".into()));
    }

    let now = Utc::now();
    let decision = state.rate_limiter.check_at(&client.ip, now);
    if !decision.allowed {
        metrics::record_rate_limited("validate_access");
        tracing::warn!(client_ip = %client.ip, "Access attempts exhausted");
        return Err(ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs(now),
        });
    }

    let study = state
        .backend
        .validate_patient_access(&dni, &hash_code(&codigo))
        .await
        .map_err(ApiError::backend(INTERNAL_ERROR))?
        .ok_or(ApiError::Unauthorized("DNI o código inválido"))?;

    tracing::info!(
        client_ip = %client.ip,
        study_id = %study.estudio_id,
        remaining = decision.remaining,
        "Patient access granted"
    );
    let mut event = AuditLog::event(events::PATIENT_ACCESS, Some(&client), json!({}));
    event.estudio_id = Some(study.estudio_id.clone());
    state.audit.record(event).await;

    Ok(Json(study_response(study)))
}

#[derive(Debug, Deserialize)]
pub struct DownloadUrlRequest {
    #[serde(default, rename = "archivoId")]
    pub archivo_id: Option<String>,
}

/// `POST /api/generate-download-url`
pub async fn generate_download_url(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DownloadUrlRequest>,
) -> Result<Json<Value>, ApiError> {
    let archivo_id = non_empty(body.archivo_id)
        .ok_or(ApiError::Validation("ID de archivo requerido".into()))?;

    let minutes = state.config.share_links.download_url_minutes;
    let url = state
        .backend
        .generate_signed_url(&archivo_id, minutes)
        .await
        .map_err(ApiError::backend("Error generando URL de descarga"))?
        .ok_or(ApiError::NotFound("Archivo no encontrado"))?;

    Ok(Json(json!({
        "success": true,
        "downloadUrl": url,
        "expiresIn": u64::from(minutes) * 60,
    })))
}
