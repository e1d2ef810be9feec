//! Audit trail of patient and staff activity.
//!
//! # Responsibilities
//! - Append events to the remote `audit_log` table
//! - Render exports as CSV (csv.rs)
//!
//! # Design Decisions
//! - Recording is best effort: a failed insert is logged and the request
//!   carries on
//! - Share tokens are stored as SHA-256 digests, never in plaintext

pub mod csv;

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{Backend, NewAuditEvent};
use crate::http::request::ClientInfo;

/// Event names written to the audit log.
pub mod events {
    pub const PATIENT_ACCESS: &str = "patient_access";
    pub const CREATE_MEDICAL_SHARE: &str = "create_medical_share";
    pub const REVOKE_MEDICAL_SHARE: &str = "revoke_medical_share";
    pub const MEDICAL_SHARE_DOWNLOAD: &str = "medical_share_download";
    pub const UPLOAD_FILE: &str = "upload_file";
    pub const CREATE_STUDY: &str = "create_study";
    pub const REGENERATE_CODE: &str = "regenerate_code";
    pub const EXPORT_CSV: &str = "export_csv";
}

/// Handle for writing audit events.
#[derive(Clone)]
pub struct AuditLog {
    backend: Arc<dyn Backend>,
}

impl AuditLog {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Build an event stamped with the caller's IP and user agent.
    pub fn event(evento: &str, client: Option<&ClientInfo>, detalles: Value) -> NewAuditEvent {
        NewAuditEvent {
            evento: evento.to_string(),
            ip_address: client.map(|c| c.ip.clone()),
            user_agent: client.map(|c| c.user_agent.clone()),
            detalles,
            ..NewAuditEvent::default()
        }
    }

    /// Append an event. Failures are logged, never returned.
    pub async fn record(&self, event: NewAuditEvent) {
        if let Err(e) = self.backend.insert_audit_event(&event).await {
            tracing::warn!(
                evento = %event.evento,
                error = %e,
                "Failed to record audit event"
            );
        }
    }
}
