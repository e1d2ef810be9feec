//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared application state (limiter, services, clients)
//! - Create the Axum router with the public portal and staff routes
//! - Wire up middleware (request ID, tracing, timeout, security headers, metrics)
//! - Serve on a listener until shutdown is signalled
//! - Run the rate limiter sweeper alongside the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{FixedOffset, Offset, Utc};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::audit::AuditLog;
use crate::backend::Backend;
use crate::config::PortalConfig;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::ApiError;
use crate::imaging::{ImagingClient, ImagingError};
use crate::observability::metrics;
use crate::portal::setup_portal_router;
use crate::security::headers::with_security_headers;
use crate::security::rate_limit::RateLimiter;
use crate::share_links::ShareLinkService;
use crate::staff::setup_staff_router;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PortalConfig>,
    pub backend: Arc<dyn Backend>,
    pub rate_limiter: RateLimiter,
    pub share_links: ShareLinkService,
    pub audit: AuditLog,
    pub imaging: Option<ImagingClient>,
}

impl AppState {
    /// Assemble the state around a data platform implementation.
    pub fn new(config: PortalConfig, backend: Arc<dyn Backend>) -> Result<Self, ImagingError> {
        let imaging = ImagingClient::from_config(
            &config.imaging,
            Duration::from_secs(config.timeouts.backend_secs),
        )?;
        let audit = AuditLog::new(backend.clone());
        let share_links = ShareLinkService::new(
            backend.clone(),
            audit.clone(),
            config.share_links.clone(),
            &config.listener.public_base_url,
        );

        Ok(Self {
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            config: Arc::new(config),
            backend,
            share_links,
            audit,
            imaging,
        })
    }

    /// Offset in which exported dates are shown.
    pub fn export_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.config.audit.export_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// HTTP server for the patient portal.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server around prepared state.
    pub fn new(state: AppState) -> Self {
        let router = build_router(state.clone());
        Self { router, state }
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweep_interval = Duration::from_secs(self.state.config.rate_limit.sweep_interval_secs);
        let sweeper = tokio::spawn(
            self.state
                .rate_limiter
                .clone()
                .run_sweeper(sweep_interval, shutdown.resubscribe()),
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Rate limit sweeper ended abnormally");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &PortalConfig {
        &self.state.config
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);

    let router = Router::new()
        .route("/health", get(health))
        .merge(setup_portal_router(state.clone()))
        .merge(setup_staff_router(state))
        .fallback(not_found)
        .layer(middleware::from_fn(track_requests))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id(request.headers()),
            )
        }))
        .layer(set_request_id_layer());

    with_security_headers(router)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Recurso no encontrado")
}

/// Count and time every request, labelled by its route template.
async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().clone();

    let response = next.run(request).await;
    metrics::record_request(&endpoint, method.as_str(), response.status().as_u16(), start);
    response
}
