//! API middleware
//!
//! The core consumes an already-authenticated caller identity: the
//! upstream gateway injects `X-User-Id` after authenticating the request.
//! No authentication happens here.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::UserId;

/// The authenticated caller, extracted from the upstream gateway header
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub UserId);

/// Extracts the caller identity injected by the upstream gateway
pub async fn caller_identity_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = request
        .headers()
        .get("x-user-id")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<UserId>().ok());

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(CallerIdentity(user_id));
            Ok(next.run(request).await)
        }
        None => {
            warn!("request without a valid X-User-Id header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Audit logging middleware
///
/// Logs all API requests for compliance and debugging
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user_id = request
        .extensions()
        .get::<CallerIdentity>()
        .map(|c| c.0.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        user = %user_id,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
