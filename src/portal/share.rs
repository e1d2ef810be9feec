//! Share link endpoints.
//!
//! Thin adapters over [`ShareLinkService`](crate::share_links::ShareLinkService):
//! body parsing, required-field checks and response shapes.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::request::{non_empty, ApiJson, ClientInfo};
use crate::http::response::ApiError;
use crate::http::server::AppState;

use super::study_response;

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    #[serde(default, rename = "estudioId")]
    pub estudio_id: Option<String>,
    #[serde(default, rename = "hoursDuration")]
    pub hours_duration: Option<i64>,
}

/// `POST /api/medical-share/create`
pub async fn create_share(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateShareRequest>,
) -> Result<Json<Value>, ApiError> {
    let estudio_id =
        non_empty(body.estudio_id).ok_or(ApiError::Validation("ID de estudio requerido".into()))?;

    let link = state
        .share_links
        .create(&estudio_id, body.hours_duration, &client)
        .await?;

    Ok(Json(json!({ "success": true, "shareLink": link })))
}

#[derive(Debug, Deserialize)]
pub struct ValidateShareRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /api/medical-share/validate`
pub async fn validate_share(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ValidateShareRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = non_empty(body.token).ok_or(ApiError::Validation("Token requerido".into()))?;
    let study = state.share_links.validate(&token).await?;
    Ok(Json(study_response(study)))
}

#[derive(Debug, Deserialize)]
pub struct RevokeShareRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub motivo: Option<String>,
}

/// `POST /api/medical-share/revoke`
pub async fn revoke_share(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(body): ApiJson<RevokeShareRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = non_empty(body.token).ok_or(ApiError::Validation("Token requerido".into()))?;
    state
        .share_links
        .revoke(&token, body.motivo.as_deref(), &client)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Enlace revocado exitosamente",
    })))
}

#[derive(Debug, Deserialize)]
pub struct ShareDownloadRequest {
    #[serde(default, rename = "archivoId")]
    pub archivo_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /api/medical-share/generate-download-url`
pub async fn generate_share_download_url(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(body): ApiJson<ShareDownloadRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(archivo_id), Some(token)) = (non_empty(body.archivo_id), non_empty(body.token))
    else {
        return Err(ApiError::Validation(
            "ID de archivo y token requeridos".into(),
        ));
    };

    let url = state
        .share_links
        .download_url(&archivo_id, &token, &client)
        .await?;

    Ok(Json(json!({
        "success": true,
        "downloadUrl": url,
        "expiresIn": state.share_links.download_url_ttl_secs(),
    })))
}
