//! Audit log listing and CSV export.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{csv::render_csv, events, AuditLog};
use crate::backend::AuditFilter;
use crate::http::request::{non_empty, ClientInfo};
use crate::http::response::ApiError;
use crate::http::server::AppState;

use super::Pagination;

const DEFAULT_PAGE_SIZE: u64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub evento: Option<String>,
    pub fecha_desde: Option<String>,
    pub fecha_hasta: Option<String>,
    pub estudio_id: Option<String>,
}

impl AuditLogQuery {
    fn filter(&self) -> AuditFilter {
        AuditFilter {
            evento: non_empty(self.evento.clone()),
            fecha_desde: non_empty(self.fecha_desde.clone()),
            fecha_hasta: non_empty(self.fecha_hasta.clone()),
            estudio_id: non_empty(self.estudio_id.clone()),
        }
    }
}

/// `GET /api/audit-logs`
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Value>, ApiError> {
    let pagination = Pagination::parse(
        query.page.as_deref(),
        query.limit.as_deref(),
        DEFAULT_PAGE_SIZE,
        u64::from(state.config.audit.max_page_size),
    )?;
    // The listing filters on event and dates only.
    let filter = AuditFilter {
        estudio_id: None,
        ..query.filter()
    };

    let page = state
        .backend
        .list_audit_logs(&filter, pagination.offset(), pagination.limit)
        .await
        .map_err(ApiError::backend("Error obteniendo logs de auditoría"))?;

    Ok(Json(json!({
        "success": true,
        "logs": page.rows,
        "pagination": pagination.body(page.total),
    })))
}

/// `GET /api/audit-logs/export`
pub async fn export_audit_logs(
    State(state): State<AppState>,
    client: ClientInfo,
    Query(query): Query<AuditLogQuery>,
) -> Result<Response, ApiError> {
    let filter = query.filter();
    let cap = state.config.audit.export_row_cap as u64;

    let page = state
        .backend
        .list_audit_logs(&filter, 0, cap)
        .await
        .map_err(ApiError::backend("Error exportando logs"))?;

    let body = render_csv(&page.rows, state.export_offset());
    tracing::info!(
        rows = page.rows.len(),
        total = page.total,
        "Audit log exported"
    );

    state
        .audit
        .record(AuditLog::event(
            events::EXPORT_CSV,
            Some(&client),
            json!({
                "filtros": {
                    "evento": filter.evento,
                    "fechaDesde": filter.fecha_desde,
                    "fechaHasta": filter.fecha_hasta,
                    "estudioId": filter.estudio_id,
                },
                "registros_exportados": page.rows.len(),
            }),
        ))
        .await;

    let disposition = format!(
        "attachment; filename=\"audit_logs_{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );
    let disposition =
        HeaderValue::from_str(&disposition).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
