//! Shared utilities for integration tests.
//!
//! `MemoryBackend` stands in for the data platform with the same observable
//! behavior: codes are matched by hash, share links expire and can be
//! revoked once, audit rows carry their study and patient joins.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use medical_portal::backend::*;
use medical_portal::config::PortalConfig;
use medical_portal::http::{build_router, AppState, HttpServer};
use medical_portal::lifecycle::Shutdown;
use medical_portal::security::codes::{generate_token, hash_code};

pub const STAFF_KEY: &str = "test-staff-key";
pub const PUBLIC_BASE_URL: &str = "https://portal.test";

/// Config used by every test: defaults plus a known staff key.
pub fn test_config() -> PortalConfig {
    let mut config = PortalConfig::default();
    config.staff.api_key = STAFF_KEY.to_string();
    config.listener.public_base_url = PUBLIC_BASE_URL.to_string();
    config
}

pub fn app(backend: Arc<MemoryBackend>) -> Router {
    app_with_config(test_config(), backend)
}

pub fn app_with_config(config: PortalConfig, backend: Arc<MemoryBackend>) -> Router {
    let state = AppState::new(config, backend).unwrap();
    build_router(state)
}

/// Serve the portal on an ephemeral port. Trigger the returned `Shutdown` to stop it.
pub async fn spawn_portal(backend: Arc<MemoryBackend>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(AppState::new(test_config(), backend).unwrap());
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// JSON POST from a fixed client IP.
pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    post_json_from(uri, body, "203.0.113.7")
}

pub fn post_json_from(uri: &str, body: Value, ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .header(header::USER_AGENT, "integration-test")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Staff request with the correct bearer key.
pub fn staff_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", STAFF_KEY))
        .header("x-forwarded-for", "198.51.100.20");
    match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

struct MemStudy {
    id: String,
    paciente_id: String,
    titulo: String,
    tipo_estudio: Option<String>,
    fecha_estudio: String,
    codigo_hash: String,
    archivos: Vec<Value>,
}

struct MemLink {
    estudio_id: String,
    summary: ShareLinkSummary,
}

struct StoredEvent {
    created_at: DateTime<Utc>,
    event: NewAuditEvent,
}

#[derive(Default)]
struct MemState {
    patients: Vec<PatientRecord>,
    studies: Vec<MemStudy>,
    links: Vec<MemLink>,
    events: Vec<StoredEvent>,
    objects: HashMap<String, (String, usize)>,
    files: Vec<FileRecord>,
    file_inserts: Vec<NewFileRecord>,
    next_id: u64,
}

impl MemState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn access(&self, study: &MemStudy) -> StudyAccess {
        let patient = self.patient(&study.paciente_id);
        StudyAccess {
            estudio_id: study.id.clone(),
            paciente_nombre: patient.map(|p| p.nombre.clone()).unwrap_or_default(),
            paciente_apellido: patient.map(|p| p.apellido.clone()).unwrap_or_default(),
            titulo: study.titulo.clone(),
            fecha_estudio: Some(study.fecha_estudio.clone()),
            archivos: Value::Array(study.archivos.clone()),
        }
    }

    fn patient(&self, id: &str) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.id == id)
    }

    fn study(&self, id: &str) -> Option<&MemStudy> {
        self.studies.iter().find(|s| s.id == id)
    }

    fn summary(&self, study: &MemStudy) -> StudySummary {
        let patient = self.patient(&study.paciente_id);
        StudySummary {
            id: study.id.clone(),
            titulo: study.titulo.clone(),
            tipo_estudio: study.tipo_estudio.clone(),
            fecha_estudio: study.fecha_estudio.clone(),
            paciente: PatientRef {
                nombre: patient.map(|p| p.nombre.clone()).unwrap_or_default(),
                apellido: patient.map(|p| p.apellido.clone()).unwrap_or_default(),
                dni: patient.map(|p| p.dni.clone()).unwrap_or_default(),
            },
        }
    }
}

/// In-memory data platform.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemState>,
    calls: AtomicUsize,
    fail_audit: AtomicBool,
    fail_share_validation: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of platform calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every audit insert fail.
    pub fn fail_audit_inserts(&self) {
        self.fail_audit.store(true, Ordering::SeqCst);
    }

    /// Make every share-link validation fail.
    pub fn fail_share_validation(&self) {
        self.fail_share_validation.store(true, Ordering::SeqCst);
    }

    /// Seed a patient with one study and one file. Returns the study ID.
    pub fn seed_study(&self, dni: &str, code: &str, file_id: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let paciente_id = state.next_id("pac");
        state.patients.push(PatientRecord {
            id: paciente_id.clone(),
            dni: dni.to_string(),
            nombre: "Ana".into(),
            apellido: "Pérez".into(),
        });
        let id = state.next_id("est");
        state.studies.push(MemStudy {
            id: id.clone(),
            paciente_id,
            titulo: "Resonancia magnética".into(),
            tipo_estudio: Some("RM".into()),
            fecha_estudio: "2024-03-01".into(),
            codigo_hash: hash_code(code),
            archivos: vec![json!({ "id": file_id, "nombre_original": "informe.pdf" })],
        });
        state.files.push(FileRecord {
            id: file_id.to_string(),
            estudio_id: id.clone(),
            nombre_original: "informe.pdf".into(),
            tipo_mime: "application/pdf".into(),
            tamano_bytes: 1024,
            es_principal: true,
        });
        id
    }

    /// Seed a share link with an explicit expiry.
    pub fn seed_link(&self, study_id: &str, token: &str, expira_en: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("lnk");
        state.links.push(MemLink {
            estudio_id: study_id.to_string(),
            summary: ShareLinkSummary {
                id,
                token: token.to_string(),
                expira_en,
                creado_por_paciente: true,
                revocado: false,
                revocado_en: None,
                motivo_revocacion: None,
                created_at: expira_en - Duration::hours(48),
            },
        });
    }

    /// Audit events recorded so far, oldest first.
    pub fn audit_events(&self) -> Vec<NewAuditEvent> {
        let state = self.state.lock().unwrap();
        state.events.iter().map(|e| e.event.clone()).collect()
    }

    /// Stored objects: path → (content type, size).
    pub fn objects(&self) -> HashMap<String, (String, usize)> {
        self.state.lock().unwrap().objects.clone()
    }

    /// File metadata rows inserted through the API, oldest first.
    pub fn file_inserts(&self) -> Vec<NewFileRecord> {
        self.state.lock().unwrap().file_inserts.clone()
    }

    pub fn revocation_reason(&self, token: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .links
            .iter()
            .find(|l| l.summary.token == token)
            .and_then(|l| l.summary.motivo_revocacion.clone())
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Date filter bound: a full timestamp, or a bare date meaning midnight UTC.
fn parse_bound(value: &Option<String>) -> Option<DateTime<Utc>> {
    let value = value.as_deref()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn validate_patient_access(
        &self,
        dni: &str,
        code_hash: &str,
    ) -> BackendResult<Option<StudyAccess>> {
        self.hit();
        let state = self.state.lock().unwrap();
        let found = state.studies.iter().find(|s| {
            s.codigo_hash == code_hash
                && state.patient(&s.paciente_id).is_some_and(|p| p.dni == dni)
        });
        Ok(found.map(|s| state.access(s)))
    }

    async fn generate_signed_url(
        &self,
        file_id: &str,
        expires_in_minutes: u32,
    ) -> BackendResult<Option<String>> {
        self.hit();
        let state = self.state.lock().unwrap();
        Ok(state.files.iter().find(|f| f.id == file_id).map(|f| {
            format!(
                "https://storage.test/{}?expires_in={}",
                f.id,
                expires_in_minutes * 60
            )
        }))
    }

    async fn create_share_link(
        &self,
        study_id: &str,
        hours_duration: u32,
        created_by_patient: bool,
    ) -> BackendResult<Option<ShareLinkRecord>> {
        self.hit();
        let mut state = self.state.lock().unwrap();
        if state.study(study_id).is_none() {
            return Ok(None);
        }
        let now = Utc::now();
        let summary = ShareLinkSummary {
            id: state.next_id("lnk"),
            token: generate_token(),
            expira_en: now + Duration::hours(i64::from(hours_duration)),
            creado_por_paciente: created_by_patient,
            revocado: false,
            revocado_en: None,
            motivo_revocacion: None,
            created_at: now,
        };
        let record = ShareLinkRecord {
            id: summary.id.clone(),
            token: summary.token.clone(),
            expira_en: summary.expira_en,
        };
        state.links.push(MemLink {
            estudio_id: study_id.to_string(),
            summary,
        });
        Ok(Some(record))
    }

    async fn validate_share_link(&self, token: &str) -> BackendResult<Option<StudyAccess>> {
        self.hit();
        if self.fail_share_validation.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                operation: "validate_medical_share_link",
                status: 500,
                body: "unavailable".into(),
            });
        }
        let state = self.state.lock().unwrap();
        let now = Utc::now();
        let link = state
            .links
            .iter()
            .find(|l| l.summary.token == token && !l.summary.revocado && now <= l.summary.expira_en);
        Ok(link
            .and_then(|l| state.study(&l.estudio_id))
            .map(|s| state.access(s)))
    }

    async fn revoke_share_link(&self, token: &str, reason: &str) -> BackendResult<bool> {
        self.hit();
        let mut state = self.state.lock().unwrap();
        match state
            .links
            .iter_mut()
            .find(|l| l.summary.token == token && !l.summary.revocado)
        {
            Some(link) => {
                link.summary.revocado = true;
                link.summary.revocado_en = Some(Utc::now());
                link.summary.motivo_revocacion = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_share_links(&self, study_id: &str) -> BackendResult<Vec<ShareLinkSummary>> {
        self.hit();
        let state = self.state.lock().unwrap();
        let mut links: Vec<_> = state
            .links
            .iter()
            .filter(|l| l.estudio_id == study_id)
            .map(|l| l.summary.clone())
            .collect();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(links)
    }

    async fn insert_audit_event(&self, event: &NewAuditEvent) -> BackendResult<()> {
        self.hit();
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                operation: "insert_audit_event",
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.state.lock().unwrap().events.push(StoredEvent {
            created_at: Utc::now(),
            event: event.clone(),
        });
        Ok(())
    }

    async fn list_audit_logs(
        &self,
        filter: &AuditFilter,
        offset: u64,
        limit: u64,
    ) -> BackendResult<AuditPage> {
        self.hit();
        let state = self.state.lock().unwrap();
        let desde = parse_bound(&filter.fecha_desde);
        let hasta = parse_bound(&filter.fecha_hasta);

        let mut matching: Vec<AuditLogRow> = state
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| filter.evento.as_ref().is_none_or(|v| &e.event.evento == v))
            .filter(|(_, e)| {
                filter
                    .estudio_id
                    .as_ref()
                    .is_none_or(|v| e.event.estudio_id.as_ref() == Some(v))
            })
            .filter(|(_, e)| desde.is_none_or(|d| e.created_at >= d))
            .filter(|(_, e)| hasta.is_none_or(|h| e.created_at <= h))
            .map(|(i, e)| {
                let study = e.event.estudio_id.as_deref().and_then(|id| state.study(id));
                AuditLogRow {
                    id: (i + 1).to_string(),
                    created_at: e.created_at,
                    evento: e.event.evento.clone(),
                    estudio_id: e.event.estudio_id.clone(),
                    ip_address: e.event.ip_address.clone(),
                    user_agent: e.event.user_agent.clone(),
                    detalles: Some(e.event.detalles.clone()),
                    estudios: study.map(|s| StudyRef {
                        titulo: s.titulo.clone(),
                        fecha_estudio: Some(s.fecha_estudio.clone()),
                    }),
                    pacientes: study
                        .and_then(|s| state.patient(&s.paciente_id))
                        .map(|p| PatientRef {
                            nombre: p.nombre.clone(),
                            apellido: p.apellido.clone(),
                            dni: p.dni.clone(),
                        }),
                }
            })
            .collect();
        matching.reverse();

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(AuditPage { rows, total })
    }

    async fn upload_object(
        &self,
        path: &str,
        content_type: &str,
        data: Bytes,
    ) -> BackendResult<String> {
        self.hit();
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(path.to_string(), (content_type.to_string(), data.len()));
        Ok(path.to_string())
    }

    async fn insert_file_record(&self, record: &NewFileRecord) -> BackendResult<FileRecord> {
        self.hit();
        let mut state = self.state.lock().unwrap();
        state.file_inserts.push(record.clone());
        let file = FileRecord {
            id: state.next_id("arch"),
            estudio_id: record.estudio_id.clone(),
            nombre_original: record.nombre_original.clone(),
            tipo_mime: record.tipo_mime.clone(),
            tamano_bytes: record.tamano_bytes,
            es_principal: record.es_principal,
        };
        state.files.push(file.clone());
        Ok(file)
    }

    async fn upsert_patient(&self, patient: &NewPatient) -> BackendResult<PatientRecord> {
        self.hit();
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.patients.iter_mut().find(|p| p.dni == patient.dni) {
            existing.nombre = patient.nombre.clone();
            existing.apellido = patient.apellido.clone();
            return Ok(existing.clone());
        }
        let record = PatientRecord {
            id: state.next_id("pac"),
            dni: patient.dni.clone(),
            nombre: patient.nombre.clone(),
            apellido: patient.apellido.clone(),
        };
        state.patients.push(record.clone());
        Ok(record)
    }

    async fn insert_study(&self, study: &NewStudy) -> BackendResult<StudyRecord> {
        self.hit();
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("est");
        state.studies.push(MemStudy {
            id: id.clone(),
            paciente_id: study.paciente_id.clone(),
            titulo: study.titulo.clone(),
            tipo_estudio: study.tipo_estudio.clone(),
            fecha_estudio: study.fecha_estudio.clone(),
            codigo_hash: study.codigo_hash.clone(),
            archivos: Vec::new(),
        });
        Ok(StudyRecord {
            id,
            paciente_id: study.paciente_id.clone(),
            titulo: study.titulo.clone(),
            tipo_estudio: study.tipo_estudio.clone(),
            fecha_estudio: study.fecha_estudio.clone(),
        })
    }

    async fn get_study(&self, study_id: &str) -> BackendResult<Option<StudySummary>> {
        self.hit();
        let state = self.state.lock().unwrap();
        Ok(state.study(study_id).map(|s| state.summary(s)))
    }

    async fn search_studies(
        &self,
        filter: &StudyFilter,
        offset: u64,
        limit: u64,
    ) -> BackendResult<StudyPage> {
        self.hit();
        let state = self.state.lock().unwrap();
        let mut matching: Vec<StudySummary> = state
            .studies
            .iter()
            .map(|s| state.summary(s))
            .filter(|s| filter.dni.as_ref().is_none_or(|d| &s.paciente.dni == d))
            .filter(|s| {
                filter
                    .tipo_estudio
                    .as_ref()
                    .is_none_or(|t| s.tipo_estudio.as_ref() == Some(t))
            })
            .filter(|s| filter.fecha_desde.as_ref().is_none_or(|d| &s.fecha_estudio >= d))
            .filter(|s| filter.fecha_hasta.as_ref().is_none_or(|h| &s.fecha_estudio <= h))
            .collect();
        matching.sort_by(|a, b| b.fecha_estudio.cmp(&a.fecha_estudio));

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(StudyPage { rows, total })
    }

    async fn update_study_code(&self, study_id: &str, code_hash: &str) -> BackendResult<bool> {
        self.hit();
        let mut state = self.state.lock().unwrap();
        match state.studies.iter_mut().find(|s| s.id == study_id) {
            Some(study) => {
                study.codigo_hash = code_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
