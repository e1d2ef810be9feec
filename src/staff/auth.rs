//! Bearer key authentication for the staff API.
//!
//! # Responsibilities
//! - Accept only `Authorization: Bearer <staff key>`
//! - Log rejected attempts with the client address
//!
//! # Design Decisions
//! - The key comparison runs in constant time
//! - An empty configured key matches nothing

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::http::request::ClientInfo;
use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Reject requests that do not carry `Authorization: Bearer <staff key>`.
pub async fn staff_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if keys_match(key.trim(), &state.config.staff.api_key) => {
            Ok(next.run(request).await)
        }
        _ => {
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            let client = ClientInfo::from_headers(request.headers(), peer);
            tracing::warn!(
                client_ip = %client.ip,
                path = %request.uri().path(),
                "Rejected staff request"
            );
            Err(ApiError::Unauthorized("No autorizado"))
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(presented: &str, expected: &str) -> bool {
    if expected.is_empty() || presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
