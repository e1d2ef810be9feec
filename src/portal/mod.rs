//! Public patient portal API.
//!
//! # Data Flow
//! ```text
//! Patient (DNI + code)
//!     → access.rs: validate → rate limit → validate_patient_access
//!     → study with files → signed download URLs
//!
//! Third party (share token)
//!     → share.rs: validate token → study with files → signed download URLs
//!
//! DICOM viewer
//!     → dicom.rs: instance file from the imaging server
//! ```
//!
//! # Design Decisions
//! - No session state: every call carries its own credentials or token
//! - Responses for unknown studies, links and files never say why

pub mod access;
pub mod dicom;
pub mod share;

use axum::{
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::backend::StudyAccess;
use crate::http::server::AppState;

pub fn setup_portal_router(state: AppState) -> Router {
    Router::new()
        .route("/api/validate-access", post(access::validate_access))
        .route("/api/generate-download-url", post(access::generate_download_url))
        .route("/api/medical-share/create", post(share::create_share))
        .route("/api/medical-share/validate", post(share::validate_share))
        .route("/api/medical-share/revoke", post(share::revoke_share))
        .route(
            "/api/medical-share/generate-download-url",
            post(share::generate_share_download_url),
        )
        .route(
            "/api/dicom/{study_id}/{series_id}/{instance_id}",
            get(dicom::get_instance),
        )
        .with_state(state)
}

/// Success body for a resolved study.
fn study_response(study: StudyAccess) -> Value {
    json!({
        "success": true,
        "study": {
            "id": study.estudio_id,
            "paciente": {
                "nombre": study.paciente_nombre,
                "apellido": study.paciente_apellido,
            },
            "titulo": study.titulo,
            "fecha_estudio": study.fecha_estudio,
            "archivos": study.archivos,
        }
    })
}
