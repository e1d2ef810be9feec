//! Study file upload.
//!
//! # Data Flow
//! ```text
//! multipart (estudioId, file, esPrincipal)
//!     → MIME allow-list → size cap
//!     → estudio_id shape check
//!     → storage: estudios/{estudio_id}/{random}.{ext}
//!     → archivos row → audit event
//! ```

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::audit::{events, AuditLog};
use crate::backend::NewFileRecord;
use crate::http::request::{non_empty, ClientInfo};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::security::codes::generate_token;
use crate::security::validators::validate_record_id;

struct UploadedFile {
    name: String,
    content_type: String,
    data: Bytes,
}

/// `POST /api/upload-file`
pub async fn upload_file(
    State(state): State<AppState>,
    client: ClientInfo,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let max_bytes = state.config.uploads.max_file_bytes;
    let too_large = || {
        ApiError::Validation(
            format!(
                "Archivo demasiado grande (máximo {}MB)",
                max_bytes / (1024 * 1024)
            )
            .into(),
        )
    };
    let read_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            tracing::debug!(error = %e, "Unreadable multipart body");
            ApiError::Validation("Solicitud inválida".into())
        }
    };

    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected upload body");
        ApiError::Validation("Solicitud inválida".into())
    })?;

    let mut estudio_id = None;
    let mut es_principal = false;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("estudioId") => estudio_id = Some(field.text().await.map_err(read_error)?),
            Some("esPrincipal") => es_principal = field.text().await.map_err(read_error)? == "true",
            Some("file") => {
                let name = field.file_name().unwrap_or("archivo").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(read_error)?;
                file = Some(UploadedFile {
                    name,
                    content_type,
                    data,
                });
            }
            _ => {}
        }
    }

    let (Some(estudio_id), Some(file)) = (non_empty(estudio_id), file) else {
        return Err(ApiError::Validation(
            "ID de estudio y archivo son requeridos".into(),
        ));
    };
    let estudio_id = estudio_id.trim().to_string();
    if !validate_record_id(&estudio_id) {
        return Err(ApiError::Validation("ID de estudio inválido".into()));
    }
    if !state
        .config
        .uploads
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed == &file.content_type)
    {
        return Err(ApiError::Validation("Tipo de archivo no permitido".into()));
    }
    if file.data.len() > max_bytes {
        return Err(too_large());
    }

    let size = file.data.len() as u64;
    let stored_name = format!(
        "{}.{}",
        generate_token(),
        file_extension(&file.name, &file.content_type)
    );
    let object_path = format!("estudios/{}/{}", estudio_id, stored_name);

    let stored_path = state
        .backend
        .upload_object(&object_path, &file.content_type, file.data)
        .await
        .map_err(ApiError::backend("Error subiendo archivo"))?;

    let archivo = state
        .backend
        .insert_file_record(&NewFileRecord {
            estudio_id: estudio_id.clone(),
            nombre_original: file.name,
            nombre_archivo: stored_name,
            tipo_mime: file.content_type,
            tamano_bytes: size,
            ruta_s3: stored_path,
            es_principal,
        })
        .await
        .map_err(ApiError::backend("Error guardando información del archivo"))?;

    tracing::info!(
        study_id = %estudio_id,
        file_id = %archivo.id,
        bytes = size,
        "File uploaded"
    );

    let mut event = AuditLog::event(
        events::UPLOAD_FILE,
        Some(&client),
        json!({
            "archivo_nombre": archivo.nombre_original,
            "tipo_mime": archivo.tipo_mime,
            "tamaño_bytes": archivo.tamano_bytes,
            "es_principal": archivo.es_principal,
            "staff_action": true,
        }),
    );
    event.estudio_id = Some(estudio_id);
    state.audit.record(event).await;

    Ok(Json(json!({ "success": true, "archivo": archivo })))
}

/// Extension for the stored object: taken from the original name when it
/// has a usable one, otherwise derived from the MIME type.
fn file_extension(name: &str, content_type: &str) -> String {
    let from_name = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name.unwrap_or_else(|| {
        match content_type {
            "application/pdf" => "pdf",
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "application/zip" => "zip",
            _ => "bin",
        }
        .to_string()
    })
}
