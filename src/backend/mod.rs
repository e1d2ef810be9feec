//! Data platform subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP handler / share-link service / audit log
//!     → Backend trait (this module)
//!     → client.rs (SupabaseClient: REST, RPC and storage over reqwest)
//!     → remote platform
//! ```
//!
//! # Design Decisions
//! - All persistence lives on the remote platform; nothing is cached here
//! - Handlers depend on `Arc<dyn Backend>` so tests can substitute an
//!   in-memory implementation
//! - No retries: every failure is surfaced to the caller immediately

pub mod client;
pub mod types;

use async_trait::async_trait;
use axum::body::Bytes;

pub use client::SupabaseClient;
pub use types::*;

/// Operations the portal needs from the data platform.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Look up the study matching a DNI and the hash of its access code.
    async fn validate_patient_access(
        &self,
        dni: &str,
        code_hash: &str,
    ) -> BackendResult<Option<StudyAccess>>;

    /// Issue a time-limited download URL for a stored file.
    async fn generate_signed_url(
        &self,
        file_id: &str,
        expires_in_minutes: u32,
    ) -> BackendResult<Option<String>>;

    /// Allocate a share link for a study.
    async fn create_share_link(
        &self,
        study_id: &str,
        hours_duration: u32,
        created_by_patient: bool,
    ) -> BackendResult<Option<ShareLinkRecord>>;

    /// Resolve an active share link to its study.
    ///
    /// Unknown, expired and revoked tokens all yield `None`.
    async fn validate_share_link(&self, token: &str) -> BackendResult<Option<StudyAccess>>;

    /// Revoke a share link. Returns false if nothing was revoked.
    async fn revoke_share_link(&self, token: &str, reason: &str) -> BackendResult<bool>;

    /// List every share link of a study, newest first.
    async fn list_share_links(&self, study_id: &str) -> BackendResult<Vec<ShareLinkSummary>>;

    /// Append an event to the audit log.
    async fn insert_audit_event(&self, event: &NewAuditEvent) -> BackendResult<()>;

    /// Page through the audit log, newest first.
    async fn list_audit_logs(
        &self,
        filter: &AuditFilter,
        offset: u64,
        limit: u64,
    ) -> BackendResult<AuditPage>;

    /// Store an object in the study bucket. Returns its path inside the
    /// bucket, the form signed URLs are issued for.
    async fn upload_object(
        &self,
        path: &str,
        content_type: &str,
        data: Bytes,
    ) -> BackendResult<String>;

    /// Record metadata for an uploaded file.
    async fn insert_file_record(&self, record: &NewFileRecord) -> BackendResult<FileRecord>;

    /// Insert a patient or update the existing one with the same DNI.
    async fn upsert_patient(&self, patient: &NewPatient) -> BackendResult<PatientRecord>;

    async fn insert_study(&self, study: &NewStudy) -> BackendResult<StudyRecord>;

    async fn get_study(&self, study_id: &str) -> BackendResult<Option<StudySummary>>;

    async fn search_studies(
        &self,
        filter: &StudyFilter,
        offset: u64,
        limit: u64,
    ) -> BackendResult<StudyPage>;

    /// Replace a study's access code hash. Returns false if no study matched.
    async fn update_study_code(&self, study_id: &str, code_hash: &str) -> BackendResult<bool>;
}
