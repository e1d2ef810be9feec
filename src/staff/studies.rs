//! Study administration: creation, search, code rotation and share links.
//!
//! Access codes are returned in plaintext exactly once, in the response that
//! created them. Only their SHA-256 hash is stored.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{events, AuditLog};
use crate::backend::{NewPatient, NewStudy, StudyFilter};
use crate::http::request::{non_empty, ApiJson, ClientInfo};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::security::codes::{generate_code, hash_code, DEFAULT_CODE_LENGTH};
use crate::security::validators::validate_dni;
use crate::share_links::ShareLinkState;

use super::Pagination;

const DEFAULT_PAGE_SIZE: u64 = 20;
const STUDY_NOT_FOUND: &str = "Estudio no encontrado";

#[derive(Debug, Deserialize)]
pub struct CreateStudyRequest {
    #[serde(default)]
    pub dni: Option<String>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub apellido: Option<String>,
    #[serde(default)]
    pub titulo: Option<String>,
    #[serde(default)]
    pub tipo_estudio: Option<String>,
    #[serde(default)]
    pub fecha_estudio: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
}

/// `POST /api/studies`
pub async fn create_study(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateStudyRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(dni), Some(nombre), Some(apellido), Some(titulo), Some(fecha_estudio)) = (
        non_empty(body.dni),
        non_empty(body.nombre),
        non_empty(body.apellido),
        non_empty(body.titulo),
        non_empty(body.fecha_estudio),
    ) else {
        return Err(ApiError::Validation(
            "DNI, nombre, apellido, título y fecha del estudio son requeridos".into(),
        ));
    };
    let dni = dni.trim().to_string();
    if !validate_dni(&dni) {
        return Err(ApiError::Validation("DNI inválido".into()));
    }
    if NaiveDate::parse_from_str(fecha_estudio.trim(), "%Y-%m-%d").is_err() {
        return Err(ApiError::Validation("Fecha de estudio inválida".into()));
    }

    let patient = state
        .backend
        .upsert_patient(&NewPatient {
            dni,
            nombre: nombre.trim().to_string(),
            apellido: apellido.trim().to_string(),
        })
        .await
        .map_err(ApiError::backend("Error guardando paciente"))?;

    let codigo = generate_code(DEFAULT_CODE_LENGTH);
    let study = state
        .backend
        .insert_study(&NewStudy {
            paciente_id: patient.id.clone(),
            titulo: titulo.trim().to_string(),
            tipo_estudio: non_empty(body.tipo_estudio),
            fecha_estudio: fecha_estudio.trim().to_string(),
            descripcion: non_empty(body.descripcion),
            codigo_hash: hash_code(&codigo),
        })
        .await
        .map_err(ApiError::backend("Error creando estudio"))?;

    tracing::info!(study_id = %study.id, patient_id = %patient.id, "Study created");

    let mut event = AuditLog::event(
        events::CREATE_STUDY,
        Some(&client),
        json!({ "titulo": study.titulo, "staff_action": true }),
    );
    event.estudio_id = Some(study.id.clone());
    event.paciente_id = Some(patient.id.clone());
    state.audit.record(event).await;

    Ok(Json(json!({
        "success": true,
        "estudio": study,
        "paciente": patient,
        "codigo": codigo,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct StudySearchQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub dni: Option<String>,
    pub fecha_desde: Option<String>,
    pub fecha_hasta: Option<String>,
    pub tipo_estudio: Option<String>,
}

/// `GET /api/studies/search`
pub async fn search_studies(
    State(state): State<AppState>,
    Query(query): Query<StudySearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let pagination = Pagination::parse(
        query.page.as_deref(),
        query.limit.as_deref(),
        DEFAULT_PAGE_SIZE,
        u64::from(state.config.audit.max_page_size),
    )?;

    let dni = non_empty(query.dni).map(|d| d.trim().to_string());
    if let Some(dni) = &dni {
        if !validate_dni(dni) {
            return Err(ApiError::Validation("DNI inválido".into()));
        }
    }
    let filter = StudyFilter {
        dni,
        fecha_desde: non_empty(query.fecha_desde),
        fecha_hasta: non_empty(query.fecha_hasta),
        tipo_estudio: non_empty(query.tipo_estudio),
    };

    let page = state
        .backend
        .search_studies(&filter, pagination.offset(), pagination.limit)
        .await
        .map_err(ApiError::backend("Error buscando estudios"))?;

    Ok(Json(json!({
        "success": true,
        "estudios": page.rows,
        "pagination": pagination.body(page.total),
    })))
}

/// `POST /api/studies/{id}/regenerate-code`
pub async fn regenerate_code(
    State(state): State<AppState>,
    client: ClientInfo,
    Path(study_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let codigo = generate_code(DEFAULT_CODE_LENGTH);
    let updated = state
        .backend
        .update_study_code(&study_id, &hash_code(&codigo))
        .await
        .map_err(ApiError::backend("Error regenerando código"))?;
    if !updated {
        return Err(ApiError::NotFound(STUDY_NOT_FOUND));
    }

    tracing::info!(study_id = %study_id, "Access code regenerated");
    let mut event = AuditLog::event(
        events::REGENERATE_CODE,
        Some(&client),
        json!({ "staff_action": true }),
    );
    event.estudio_id = Some(study_id);
    state.audit.record(event).await;

    Ok(Json(json!({ "success": true, "codigo": codigo })))
}

/// `GET /api/studies/{id}/medical-shares`
pub async fn list_medical_shares(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let study = state
        .backend
        .get_study(&study_id)
        .await
        .map_err(ApiError::backend("Error obteniendo estudio"))?
        .ok_or(ApiError::NotFound(STUDY_NOT_FOUND))?;

    let links = state
        .backend
        .list_share_links(&study_id)
        .await
        .map_err(ApiError::backend("Error obteniendo enlaces"))?;

    let now = Utc::now();
    let shares: Vec<Value> = links
        .into_iter()
        .map(|link| {
            let estado = ShareLinkState::of(&link, now);
            let mut value = json!(link);
            value["estado"] = json!(estado);
            value
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "estudio": study,
        "shares": shares,
    })))
}
