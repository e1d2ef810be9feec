//! REST client for the data platform.
//!
//! # Responsibilities
//! - Call remote procedures (`/rest/v1/rpc/{name}`)
//! - Read and write tables through PostgREST filters (`/rest/v1/{table}`)
//! - Upload objects to storage (`/storage/v1/object/{bucket}/{path}`)
//! - Map transport, status and decoding failures to `BackendError`
//!
//! # Design Decisions
//! - One `reqwest::Client` per process, with a fixed request timeout
//! - The service key is sent as both `apikey` and bearer token
//! - Total counts come from the `Content-Range` header (`Prefer: count=exact`)
//! - Stored objects are addressed by their path inside the bucket

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::types::*;
use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::observability::metrics;

const AUDIT_SELECT: &str = "*,estudios(titulo,fecha_estudio),pacientes(nombre,apellido,dni)";
const STUDY_SELECT: &str = "id,titulo,tipo_estudio,fecha_estudio,pacientes!inner(nombre,apellido,dni)";
const SHARE_SELECT: &str =
    "id,token,expira_en,creado_por_paciente,revocado,revocado_en,motivo_revocacion,created_at";

/// Data platform client.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
}

impl SupabaseClient {
    /// Build a client from configuration.
    pub fn new(config: &BackendConfig, timeout: Duration) -> BackendResult<Self> {
        let base = url::Url::parse(&config.url)
            .map_err(|e| BackendError::Config(format!("invalid URL '{}': {}", config.url, e)))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|_| BackendError::Config("service key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| BackendError::Config("service key is not a valid header value".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            bucket: config.storage_bucket.clone(),
        })
    }

    fn rest(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, path))
    }

    /// Storage endpoint for `path` inside the configured bucket. Each part of
    /// `path` is encoded as its own segment.
    fn storage_url(&self, path: &str) -> BackendResult<url::Url> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| BackendError::Config(format!("invalid URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Config(format!("'{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", self.bucket.as_str()])
            .extend(path.split('/'));
        Ok(url)
    }

    /// Send a request, recording metrics and rejecting non-success statuses.
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> BackendResult<Response> {
        let start = Instant::now();
        let result = request.send().await;

        let response = match result {
            Ok(r) => r,
            Err(source) => {
                metrics::record_backend_call(operation, "transport_error", start);
                return Err(BackendError::Transport { operation, source });
            }
        };

        let status = response.status();
        if !status.is_success() {
            metrics::record_backend_call(operation, "status_error", start);
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        metrics::record_backend_call(operation, "ok", start);
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> BackendResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { operation, source })?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode {
            operation,
            message: e.to_string(),
        })
    }

    async fn rpc<P, T>(&self, name: &'static str, params: &P) -> BackendResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.rest(Method::POST, &format!("rpc/{}", name)).json(params);
        let response = self.send(name, request).await?;
        Self::decode(name, response).await
    }

    /// Insert one row and return its representation.
    async fn insert_returning<B, T>(
        &self,
        operation: &'static str,
        table: &str,
        query: &[(&str, &str)],
        prefer: &str,
        body: &B,
    ) -> BackendResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self
            .rest(Method::POST, table)
            .query(query)
            .header("Prefer", prefer)
            .json(body);
        let response = self.send(operation, request).await?;
        let mut rows: Vec<T> = Self::decode(operation, response).await?;
        if rows.is_empty() {
            return Err(BackendError::Decode {
                operation,
                message: "no row returned".into(),
            });
        }
        Ok(rows.swap_remove(0))
    }
}

/// Total from a `Content-Range` header such as `0-49/1234` or `*/0`.
fn parse_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-range")?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

/// PostgREST filter tuples for the optional values that are set.
fn push_filter(query: &mut Vec<(String, String)>, column: &str, op: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        query.push((column.to_string(), format!("{}.{}", op, v)));
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn validate_patient_access(
        &self,
        dni: &str,
        code_hash: &str,
    ) -> BackendResult<Option<StudyAccess>> {
        let rows: Vec<StudyAccess> = self
            .rpc(
                "validate_patient_access",
                &json!({ "p_dni": dni, "p_codigo_hash": code_hash }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn generate_signed_url(
        &self,
        file_id: &str,
        expires_in_minutes: u32,
    ) -> BackendResult<Option<String>> {
        self.rpc(
            "generate_signed_url",
            &json!({ "p_archivo_id": file_id, "p_expires_in_minutes": expires_in_minutes }),
        )
        .await
    }

    async fn create_share_link(
        &self,
        study_id: &str,
        hours_duration: u32,
        created_by_patient: bool,
    ) -> BackendResult<Option<ShareLinkRecord>> {
        let rows: Vec<ShareLinkRecord> = self
            .rpc(
                "create_medical_share_link",
                &json!({
                    "p_estudio_id": study_id,
                    "p_hours_duration": hours_duration,
                    "p_creado_por_paciente": created_by_patient,
                }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn validate_share_link(&self, token: &str) -> BackendResult<Option<StudyAccess>> {
        let rows: Vec<StudyAccess> = self
            .rpc("validate_medical_share_link", &json!({ "p_token": token }))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn revoke_share_link(&self, token: &str, reason: &str) -> BackendResult<bool> {
        let revoked: Option<bool> = self
            .rpc(
                "revoke_medical_share_link",
                &json!({ "p_token": token, "p_motivo": reason }),
            )
            .await?;
        Ok(revoked.unwrap_or(false))
    }

    async fn list_share_links(&self, study_id: &str) -> BackendResult<Vec<ShareLinkSummary>> {
        let request = self.rest(Method::GET, "medical_share_links").query(&[
            ("select", SHARE_SELECT.to_string()),
            ("estudio_id", format!("eq.{}", study_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        let response = self.send("list_share_links", request).await?;
        Self::decode("list_share_links", response).await
    }

    async fn insert_audit_event(&self, event: &NewAuditEvent) -> BackendResult<()> {
        let request = self
            .rest(Method::POST, "audit_log")
            .header("Prefer", "return=minimal")
            .json(event);
        self.send("insert_audit_event", request).await?;
        Ok(())
    }

    async fn list_audit_logs(
        &self,
        filter: &AuditFilter,
        offset: u64,
        limit: u64,
    ) -> BackendResult<AuditPage> {
        let mut query = vec![
            ("select".to_string(), AUDIT_SELECT.to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
            ("offset".to_string(), offset.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        push_filter(&mut query, "evento", "eq", &filter.evento);
        push_filter(&mut query, "created_at", "gte", &filter.fecha_desde);
        push_filter(&mut query, "created_at", "lte", &filter.fecha_hasta);
        push_filter(&mut query, "estudio_id", "eq", &filter.estudio_id);

        let request = self
            .rest(Method::GET, "audit_log")
            .query(&query)
            .header("Prefer", "count=exact");
        let response = self.send("list_audit_logs", request).await?;
        let total = parse_total(response.headers());
        let rows: Vec<AuditLogRow> = Self::decode("list_audit_logs", response).await?;
        let total = total.unwrap_or(offset + rows.len() as u64);
        Ok(AuditPage { rows, total })
    }

    async fn upload_object(
        &self,
        path: &str,
        content_type: &str,
        data: Bytes,
    ) -> BackendResult<String> {
        let request = self
            .http
            .post(self.storage_url(path)?)
            .header(CONTENT_TYPE, content_type)
            .header("cache-control", "3600")
            .header("x-upsert", "false")
            .body(data);
        let response = self.send("upload_object", request).await?;
        let uploaded: UploadResponse = Self::decode("upload_object", response).await?;
        tracing::debug!(key = ?uploaded.key, "Object stored");
        Ok(path.to_string())
    }

    async fn insert_file_record(&self, record: &NewFileRecord) -> BackendResult<FileRecord> {
        self.insert_returning(
            "insert_file_record",
            "archivos",
            &[],
            "return=representation",
            &[record],
        )
        .await
    }

    async fn upsert_patient(&self, patient: &NewPatient) -> BackendResult<PatientRecord> {
        self.insert_returning(
            "upsert_patient",
            "pacientes",
            &[("on_conflict", "dni")],
            "resolution=merge-duplicates,return=representation",
            &[patient],
        )
        .await
    }

    async fn insert_study(&self, study: &NewStudy) -> BackendResult<StudyRecord> {
        self.insert_returning(
            "insert_study",
            "estudios",
            &[("select", "id,paciente_id,titulo,tipo_estudio,fecha_estudio")],
            "return=representation",
            &[study],
        )
        .await
    }

    async fn get_study(&self, study_id: &str) -> BackendResult<Option<StudySummary>> {
        let request = self.rest(Method::GET, "estudios").query(&[
            ("select", STUDY_SELECT.to_string()),
            ("id", format!("eq.{}", study_id)),
            ("limit", "1".to_string()),
        ]);
        let response = self.send("get_study", request).await?;
        let rows: Vec<StudySummary> = Self::decode("get_study", response).await?;
        Ok(rows.into_iter().next())
    }

    async fn search_studies(
        &self,
        filter: &StudyFilter,
        offset: u64,
        limit: u64,
    ) -> BackendResult<StudyPage> {
        let mut query = vec![
            ("select".to_string(), STUDY_SELECT.to_string()),
            ("order".to_string(), "fecha_estudio.desc".to_string()),
            ("offset".to_string(), offset.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        push_filter(&mut query, "pacientes.dni", "eq", &filter.dni);
        push_filter(&mut query, "fecha_estudio", "gte", &filter.fecha_desde);
        push_filter(&mut query, "fecha_estudio", "lte", &filter.fecha_hasta);
        push_filter(&mut query, "tipo_estudio", "eq", &filter.tipo_estudio);

        let request = self
            .rest(Method::GET, "estudios")
            .query(&query)
            .header("Prefer", "count=exact");
        let response = self.send("search_studies", request).await?;
        let total = parse_total(response.headers());
        let rows: Vec<StudySummary> = Self::decode("search_studies", response).await?;
        let total = total.unwrap_or(offset + rows.len() as u64);
        Ok(StudyPage { rows, total })
    }

    async fn update_study_code(&self, study_id: &str, code_hash: &str) -> BackendResult<bool> {
        let request = self
            .rest(Method::PATCH, "estudios")
            .query(&[("id", format!("eq.{}", study_id)), ("select", "id".to_string())])
            .header("Prefer", "return=representation")
            .json(&json!({
                "codigo_hash": code_hash,
                "codigo_actualizado_en": chrono::Utc::now(),
            }));
        let response = self.send("update_study_code", request).await?;
        let rows: Vec<serde_json::Value> = Self::decode("update_study_code", response).await?;
        Ok(!rows.is_empty())
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish()
    }
}
