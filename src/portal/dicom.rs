//! DICOM instance pass-through.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::http::response::ApiError;
use crate::http::server::AppState;

const DICOM_NOT_FOUND: &str = "Archivo DICOM no encontrado";

/// `GET /api/dicom/{study_id}/{series_id}/{instance_id}`
///
/// The instance is fetched whole and returned as an `application/dicom`
/// attachment.
pub async fn get_instance(
    State(state): State<AppState>,
    Path((study_id, series_id, instance_id)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let imaging = state
        .imaging
        .as_ref()
        .ok_or(ApiError::NotFound(DICOM_NOT_FOUND))?;
    if ![study_id.as_str(), series_id.as_str(), instance_id.as_str()]
        .into_iter()
        .all(is_dicom_id)
    {
        tracing::warn!("Rejected malformed DICOM identifier");
        return Err(ApiError::NotFound(DICOM_NOT_FOUND));
    }

    // Transport failures are a 500; the upstream answering non-2xx is a 404.
    let data = imaging
        .fetch_instance(&study_id, &series_id, &instance_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound(DICOM_NOT_FOUND))?;

    tracing::debug!(bytes = data.len(), "Served DICOM instance");

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}.dcm\"",
        sanitize_filename(&instance_id)
    ))
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/dicom")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        ],
        data,
    )
        .into_response())
}

/// DICOM UIDs and imaging server IDs: letters, digits, `.`, `-` and `_`,
/// and never a bare `.` or `..`.
fn is_dicom_id(id: &str) -> bool {
    (1..=128).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        && id.chars().any(|c| c != '.')
}

/// Keep only characters that are safe inside a quoted filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}
