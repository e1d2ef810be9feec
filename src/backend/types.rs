//! Records exchanged with the data platform, and the error type for calls
//! against it.
//!
//! Field names follow the platform's schema (Spanish column names), so the
//! same structs deserialize remote rows and serialize API responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the data platform.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Client could not be constructed from configuration.
    #[error("Backend configuration error: {0}")]
    Config(String),

    /// Connection, timeout or other transport failure.
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a non-success status.
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("{operation} response could not be decoded: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

/// Result type for platform operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// A study row returned by access and share-link validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyAccess {
    pub estudio_id: String,
    pub paciente_nombre: String,
    pub paciente_apellido: String,
    pub titulo: String,
    #[serde(default)]
    pub fecha_estudio: Option<String>,
    /// File descriptors, passed through untouched.
    #[serde(default)]
    pub archivos: serde_json::Value,
}

/// A freshly created share link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareLinkRecord {
    pub id: String,
    pub token: String,
    pub expira_en: DateTime<Utc>,
}

/// A share link as listed for staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareLinkSummary {
    pub id: String,
    pub token: String,
    pub expira_en: DateTime<Utc>,
    #[serde(default)]
    pub creado_por_paciente: bool,
    #[serde(default)]
    pub revocado: bool,
    #[serde(default)]
    pub revocado_en: Option<DateTime<Utc>>,
    #[serde(default)]
    pub motivo_revocacion: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An event to append to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NewAuditEvent {
    pub evento: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estudio_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paciente_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub detalles: serde_json::Value,
}

/// Patient fields joined onto audit and study rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRef {
    pub nombre: String,
    pub apellido: String,
    pub dni: String,
}

/// Study fields joined onto audit rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRef {
    pub titulo: String,
    #[serde(default)]
    pub fecha_estudio: Option<String>,
}

/// A stored audit log entry with its joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub evento: String,
    #[serde(default)]
    pub estudio_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub detalles: Option<serde_json::Value>,
    #[serde(default)]
    pub estudios: Option<StudyRef>,
    #[serde(default)]
    pub pacientes: Option<PatientRef>,
}

/// Audit log filters shared by listing and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuditFilter {
    pub evento: Option<String>,
    pub fecha_desde: Option<String>,
    pub fecha_hasta: Option<String>,
    pub estudio_id: Option<String>,
}

/// One page of audit rows plus the total match count.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditPage {
    pub rows: Vec<AuditLogRow>,
    pub total: u64,
}

/// File metadata to insert after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub estudio_id: String,
    pub nombre_original: String,
    pub nombre_archivo: String,
    pub tipo_mime: String,
    #[serde(rename = "tamaño_bytes")]
    pub tamano_bytes: u64,
    pub ruta_s3: String,
    pub es_principal: bool,
}

/// A stored file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub estudio_id: String,
    pub nombre_original: String,
    pub tipo_mime: String,
    #[serde(rename = "tamaño_bytes")]
    pub tamano_bytes: u64,
    pub es_principal: bool,
}

/// Patient identity, upserted by DNI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub dni: String,
    pub nombre: String,
    pub apellido: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub dni: String,
    pub nombre: String,
    pub apellido: String,
}

/// A study to insert. Only the hash of the access code is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudy {
    pub paciente_id: String,
    pub titulo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_estudio: Option<String>,
    pub fecha_estudio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    pub codigo_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub id: String,
    pub paciente_id: String,
    pub titulo: String,
    #[serde(default)]
    pub tipo_estudio: Option<String>,
    pub fecha_estudio: String,
}

/// Study search filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StudyFilter {
    pub dni: Option<String>,
    pub fecha_desde: Option<String>,
    pub fecha_hasta: Option<String>,
    pub tipo_estudio: Option<String>,
}

/// A study with its patient, as listed for staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySummary {
    pub id: String,
    pub titulo: String,
    #[serde(default)]
    pub tipo_estudio: Option<String>,
    pub fecha_estudio: String,
    #[serde(alias = "pacientes")]
    pub paciente: PatientRef,
}

/// One page of studies plus the total match count.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyPage {
    pub rows: Vec<StudySummary>,
    pub total: u64,
}
