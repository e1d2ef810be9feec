//! Share link lifecycle tests: create, validate, download, revoke, expire.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tower::ServiceExt;

use medical_portal::audit::events;
use medical_portal::security::codes::hash_token;

mod common;
use common::{app, body_json, post_json, spawn_portal, MemoryBackend, PUBLIC_BASE_URL};

const INVALID_LINK: &str = "Enlace inválido, expirado o revocado";

#[tokio::test]
async fn test_create_validate_revoke() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    let app = app(backend.clone());

    let before = Utc::now();
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/medical-share/create",
            json!({ "estudioId": study_id, "hoursDuration": 48 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let token = body["shareLink"]["token"].as_str().unwrap().to_string();
    assert_eq!(
        body["shareLink"]["url"],
        format!("{}/medical-view/{}", PUBLIC_BASE_URL, token)
    );
    let expires: DateTime<Utc> = body["shareLink"]["expira_en"].as_str().unwrap().parse().unwrap();
    assert!(expires >= before + Duration::hours(48));
    assert!(expires <= Utc::now() + Duration::hours(48));

    let response = app
        .clone()
        .oneshot(post_json("/api/medical-share/validate", json!({ "token": token })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["study"]["id"], study_id.as_str());

    let response = app
        .clone()
        .oneshot(post_json("/api/medical-share/revoke", json!({ "token": token })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "Enlace revocado exitosamente"
    );
    assert_eq!(
        backend.revocation_reason(&token).as_deref(),
        Some("Revocado por el usuario")
    );

    let response = app
        .clone()
        .oneshot(post_json("/api/medical-share/validate", json!({ "token": token })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], INVALID_LINK);

    let response = app
        .oneshot(post_json("/api/medical-share/revoke", json!({ "token": token })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["error"],
        "Enlace no encontrado o ya revocado"
    );
}

#[tokio::test]
async fn test_duration_out_of_range_makes_no_remote_call() {
    let backend = MemoryBackend::new();
    let app = app(backend.clone());

    for hours in [12, 23, 73, -1] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/medical-share/create",
                json!({ "estudioId": "est-1", "hoursDuration": hours }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "hours={hours}");
        assert_eq!(
            body_json(response).await["error"],
            "La duración debe estar entre 24 y 72 horas"
        );
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_default_duration_and_bounds() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    let app = app(backend);

    for (hours, expected) in [(None, 48), (Some(24), 24), (Some(72), 72)] {
        let mut body = json!({ "estudioId": study_id });
        if let Some(h) = hours {
            body["hoursDuration"] = json!(h);
        }
        let start = Utc::now();
        let response = app
            .clone()
            .oneshot(post_json("/api/medical-share/create", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let expires: DateTime<Utc> =
            body["shareLink"]["expira_en"].as_str().unwrap().parse().unwrap();
        let hours_left = (expires - start).num_minutes() as f64 / 60.0;
        assert!((hours_left - expected as f64).abs() < 0.1, "{hours:?}");
    }
}

#[tokio::test]
async fn test_missing_fields() {
    let app = app(MemoryBackend::new());
    let cases = [
        ("/api/medical-share/create", json!({}), "ID de estudio requerido"),
        ("/api/medical-share/validate", json!({}), "Token requerido"),
        ("/api/medical-share/revoke", json!({ "token": "" }), "Token requerido"),
        (
            "/api/medical-share/generate-download-url",
            json!({ "token": "abc" }),
            "ID de archivo y token requeridos",
        ),
    ];
    for (uri, body, message) in cases {
        let response = app.clone().oneshot(post_json(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_json(response).await["error"], message, "{uri}");
    }
}

#[tokio::test]
async fn test_expired_and_unknown_links_look_the_same() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    backend.seed_link(&study_id, "expired-token", Utc::now() - Duration::minutes(1));
    let app = app(backend);

    for token in ["expired-token", "never-issued"] {
        let response = app
            .clone()
            .oneshot(post_json("/api/medical-share/validate", json!({ "token": token })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], INVALID_LINK);
    }
}

#[tokio::test]
async fn test_share_download_url() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    backend.seed_link(&study_id, "live-token", Utc::now() + Duration::hours(10));
    backend.seed_link(&study_id, "old-token", Utc::now() - Duration::hours(1));
    let app = app(backend.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/medical-share/generate-download-url",
            json!({ "archivoId": "file-1", "token": "live-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["expiresIn"], 600);
    assert!(body["downloadUrl"].as_str().unwrap().contains("file-1"));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/medical-share/generate-download-url",
            json!({ "archivoId": "file-1", "token": "old-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Token inválido o expirado");

    let response = app
        .oneshot(post_json(
            "/api/medical-share/generate-download-url",
            json!({ "archivoId": "nope", "token": "live-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let downloads: Vec<_> = backend
        .audit_events()
        .into_iter()
        .filter(|e| e.evento == events::MEDICAL_SHARE_DOWNLOAD)
        .collect();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].detalles["archivo_id"], "file-1");
}

#[tokio::test]
async fn test_share_download_lookup_failure_is_401() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    backend.seed_link(&study_id, "live-token", Utc::now() + Duration::hours(10));
    backend.fail_share_validation();
    let app = app(backend.clone());

    let response = app
        .oneshot(post_json(
            "/api/medical-share/generate-download-url",
            json!({ "archivoId": "file-1", "token": "live-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Token inválido o expirado");
    assert!(backend
        .audit_events()
        .iter()
        .all(|e| e.evento != events::MEDICAL_SHARE_DOWNLOAD));
}

#[tokio::test]
async fn test_audit_stores_token_hash_only() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    let app = app(backend.clone());

    let response = app
        .oneshot(post_json(
            "/api/medical-share/create",
            json!({ "estudioId": study_id }),
        ))
        .await
        .unwrap();
    let token = body_json(response).await["shareLink"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let recorded = backend.audit_events();
    let created = recorded
        .iter()
        .find(|e| e.evento == events::CREATE_MEDICAL_SHARE)
        .unwrap();
    assert_eq!(created.estudio_id.as_deref(), Some(study_id.as_str()));
    assert_eq!(created.detalles["token_hash"], hash_token(&token));
    assert_eq!(created.detalles["duracion_horas"], 48);
    assert!(!created.detalles.to_string().contains(&token));
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_request() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    backend.fail_audit_inserts();
    let app = app(backend.clone());

    let response = app
        .oneshot(post_json(
            "/api/medical-share/create",
            json!({ "estudioId": study_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(backend.audit_events().is_empty());
}

#[tokio::test]
async fn test_share_flow_over_the_wire() {
    let backend = MemoryBackend::new();
    let study_id = backend.seed_study("30123456", "AB12CD34", "file-1");
    let (addr, shutdown) = spawn_portal(backend).await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let created: serde_json::Value = client
        .post(format!("http://{}/api/medical-share/create", addr))
        .json(&json!({ "estudioId": study_id, "hoursDuration": 24 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = created["shareLink"]["token"].as_str().unwrap();

    let response = client
        .post(format!("http://{}/api/medical-share/validate", addr))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    shutdown.trigger();
}
