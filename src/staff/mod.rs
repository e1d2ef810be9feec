//! Staff API, guarded by a bearer key.
//!
//! # Responsibilities
//! - Upload study files (upload.rs)
//! - Browse and export the audit log (audit.rs)
//! - Create studies, search them, rotate access codes, list share links (studies.rs)
//!
//! # Design Decisions
//! - Authentication is a route layer, so unknown paths still answer 404
//! - Only the upload route lifts the default body limit

pub mod audit;
pub mod auth;
pub mod studies;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::http::response::ApiError;
use crate::http::server::AppState;

use self::auth::staff_auth_middleware;

/// Room for multipart boundaries and the non-file fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn setup_staff_router(state: AppState) -> Router {
    let upload_limit = state.config.uploads.max_file_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route(
            "/api/upload-file",
            post(upload::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/audit-logs", get(audit::list_audit_logs))
        .route("/api/audit-logs/export", get(audit::export_audit_logs))
        .route("/api/studies", post(studies::create_study))
        .route("/api/studies/search", get(studies::search_studies))
        .route(
            "/api/studies/{id}/regenerate-code",
            post(studies::regenerate_code),
        )
        .route(
            "/api/studies/{id}/medical-shares",
            get(studies::list_medical_shares),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            staff_auth_middleware,
        ))
        .with_state(state)
}

/// Validated page and page size of a listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    /// Parse `page` (default 1) and `limit` (default `default_limit`, at most `max_limit`).
    pub fn parse(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: u64,
        max_limit: u64,
    ) -> Result<Self, ApiError> {
        let invalid = || ApiError::Validation("Parámetros de paginación inválidos".into());

        let page = match page.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.parse::<u64>().map_err(|_| invalid())?,
            None => 1,
        };
        let limit = match limit.map(str::trim).filter(|l| !l.is_empty()) {
            Some(l) => l.parse::<u64>().map_err(|_| invalid())?,
            None => default_limit,
        };

        if page == 0 || limit == 0 || limit > max_limit {
            return Err(invalid());
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// The `pagination` object of a listing response.
    pub fn body(&self, total: u64) -> Value {
        json!({
            "page": self.page,
            "limit": self.limit,
            "total": total,
            "totalPages": total.div_ceil(self.limit),
        })
    }
}
