//! Payments API Server Binary
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin payments-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin payments-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_CONEKTA__API_KEY` / `API_CONEKTA__WEBHOOK_SECRET`
//! * `API_MERCADO_PAGO__API_KEY` / `API_MERCADO_PAGO__WEBHOOK_SECRET`
//! * `API_STP__COMPANY` / `API_STP__SIGNING_KEY` / `API_STP__WEBHOOK_SECRET`

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_payments::{GatewayRegistry, PaymentOrchestrator, WebhookReconciler};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PgPaymentStore};
use interface_api::{config::ApiConfig, create_router, AppState};
use provider_adapters::{
    ConektaConfig, ConektaGateway, MercadoPagoConfig, MercadoPagoGateway, StpConfig, StpGateway,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().unwrap_or_default();

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting payments API server"
    );

    let pool = create_pool(DatabaseConfig::new(&config.database_url)).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(PgPaymentStore::new(pool));
    let gateways = Arc::new(build_gateways(&config));

    let state = AppState {
        orchestrator: Arc::new(PaymentOrchestrator::new(store.clone(), gateways.clone())),
        reconciler: Arc::new(WebhookReconciler::new(store, gateways)),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);
    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Constructs one gateway instance per provider for this process
fn build_gateways(config: &ApiConfig) -> GatewayRegistry {
    let mut conekta = ConektaConfig::new(
        config.conekta.api_key.clone(),
        config.conekta.webhook_secret.clone(),
    );
    if let Some(url) = &config.conekta.base_url {
        conekta = conekta.with_base_url(url.clone());
    }

    let mut mercado_pago = MercadoPagoConfig::new(
        config.mercado_pago.api_key.clone(),
        config.mercado_pago.webhook_secret.clone(),
    );
    if let Some(url) = &config.mercado_pago.base_url {
        mercado_pago = mercado_pago.with_base_url(url.clone());
    }

    let mut stp = StpConfig::new(
        config.stp.company.clone(),
        config.stp.signing_key.clone(),
        config.stp.webhook_secret.clone(),
    );
    if let Some(url) = &config.stp.base_url {
        stp = stp.with_base_url(url.clone());
    }

    GatewayRegistry::new()
        .register(Arc::new(ConektaGateway::new(conekta)))
        .register(Arc::new(MercadoPagoGateway::new(mercado_pago)))
        .register(Arc::new(StpGateway::new(stp)))
}

/// Initializes the tracing subscriber for structured logging
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
