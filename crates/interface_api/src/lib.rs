//! HTTP API Layer
//!
//! REST surface for the payment orchestration core using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: payment operations and provider webhook ingress
//! - **Middleware**: caller identity (injected by the upstream gateway)
//!   and audit logging
//! - **DTOs**: request/response data transfer objects
//! - **Error Handling**: canonical taxonomy mapped onto HTTP

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_payments::{PaymentOrchestrator, WebhookReconciler};

use crate::config::ApiConfig;
use crate::handlers::{health, payments, webhooks};
use crate::middleware::{audit_middleware, caller_identity_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
    pub config: Arc<ApiConfig>,
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes: health and provider webhook ingress (providers
    // authenticate via signatures, not caller identity)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/webhooks/:provider", post(webhooks::ingest));

    // Payment routes, behind the gateway-injected caller identity
    let payment_routes = Router::new()
        .route("/", post(payments::create_payment))
        .route("/:id", get(payments::get_payment))
        .route("/:id/confirm", post(payments::confirm_payment))
        .route("/:id/refunds", post(payments::refund_payment));

    let api_routes = Router::new()
        .nest("/payments", payment_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn(caller_identity_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
