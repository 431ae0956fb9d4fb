// Vigil API server
// Decision: PostgreSQL when DATABASE_URL is set, otherwise an in-memory dev store
// Decision: Audit events queued at shutdown are flushed before exit

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use vigil_control_plane::{
    app::{build_router, cors_layer, parse_cors_origins, spawn_maintenance},
    auth::{AuthConfig, AuditRecorder, AuthState},
    storage::StorageBackend,
};
use vigil_core::telemetry::{init_telemetry, TelemetryConfig};
use vigil_core::{ClassifierClient, LogNotifier};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Configure via environment variables:
    // - RUST_LOG / LOG_LEVEL: Log filter (default: "vigil_control_plane=debug,tower_http=debug")
    // - LOG_FORMAT: "json" for structured output
    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "vigil" {
        telemetry_config.service_name = "vigil-control-plane".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter =
            Some("vigil_control_plane=debug,vigil_core=info,tower_http=debug".to_string());
    }
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(&telemetry_config);

    // Initialize storage
    let db = match std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
        Some(url) => {
            let db = StorageBackend::postgres(&url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Connected to database");
            db
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage (data is lost on restart)");
            StorageBackend::in_memory()
        }
    };

    // Load authentication configuration
    let auth_config = AuthConfig::from_env();
    tracing::info!(
        access_token_secs = auth_config.jwt.access_token_lifetime.as_secs(),
        refresh_token_secs = auth_config.jwt.refresh_token_lifetime.as_secs(),
        login_max_attempts = auth_config.login_rate_limit.max_attempts,
        signup_disabled = auth_config.disable_signup,
        trust_proxy_headers = auth_config.trust_proxy_headers,
        "Authentication configured"
    );

    let (audit, audit_task) = AuditRecorder::spawn(db.clone(), auth_config.audit_queue_capacity);
    let auth_state = AuthState::new(auth_config, db, audit.clone(), Arc::new(LogNotifier));

    let classifier_url =
        std::env::var("CLASSIFIER_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let classifier = ClassifierClient::new(&classifier_url, Duration::from_secs(30))
        .context("Failed to build classifier client")?;
    tracing::info!(url = %classifier.base_url(), "Classifier configured");

    let maintenance = spawn_maintenance(auth_state.clone(), MAINTENANCE_INTERVAL);

    // Load CORS allowed origins from environment (optional)
    // Example: CORS_ALLOWED_ORIGINS="https://app.example.com,https://admin.example.com"
    let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .map(|s| parse_cors_origins(&s))
        .unwrap_or_default();

    let app = build_router(auth_state, classifier);
    let app = if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
        app
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
        app.layer(cors_layer(cors_origins))
    };
    let app = app.layer(TraceLayer::new_for_http());

    // Start HTTP server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    maintenance.abort();
    audit.flush().await;
    drop(audit);
    if tokio::time::timeout(Duration::from_secs(5), audit_task)
        .await
        .is_err()
    {
        tracing::debug!("Audit writer still referenced at shutdown");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
