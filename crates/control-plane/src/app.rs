// Router assembly and background maintenance
// Decision: Route wiring lives in the library so tests exercise the same router as the binary
// Decision: CORS is opt-in; without configured origins only same-origin requests work

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use vigil_core::ClassifierClient;

use crate::api::{
    audit_logs::AuditLogsState, health::HealthState, reports::ReportsState, users::UsersState,
};
use crate::auth::AuthState;
use crate::openapi::ApiDoc;

/// Build the full HTTP router (without transport layers)
pub fn build_router(auth: AuthState, classifier: ClassifierClient) -> Router {
    let health_state = HealthState {
        storage: auth.db.kind(),
    };
    let users_state = UsersState { auth: auth.clone() };
    let audit_logs_state = AuditLogsState { auth: auth.clone() };
    let reports_state = ReportsState {
        auth: auth.clone(),
        classifier,
    };

    Router::new()
        .merge(crate::api::health::routes(health_state))
        .merge(crate::auth::routes::routes(auth))
        .merge(crate::api::users::routes(users_state))
        .merge(crate::api::audit_logs::routes(audit_logs_state))
        .merge(crate::api::reports::routes(reports_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
}

/// Parse a comma separated origin list (CORS_ALLOWED_ORIGINS)
pub fn parse_cors_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

pub fn cors_layer(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
        ])
}

/// Periodically purge expired tokens and idle rate-limit windows
pub fn spawn_maintenance(auth: AuthState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_maintenance(&auth).await;
        }
    })
}

async fn run_maintenance(auth: &AuthState) {
    let now = Utc::now();
    auth.rate_limiter.cleanup();

    // Expired refresh tokens are kept for one more lifetime so a late replay
    // is still reported as a replay or an expiry rather than an unknown token
    let retention = chrono::Duration::from_std(auth.config.jwt.refresh_token_lifetime)
        .unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = now.checked_sub_signed(retention).unwrap_or(now);

    match auth.db.delete_expired_refresh_tokens(cutoff).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(count = n, "Deleted expired refresh tokens"),
        Err(e) => tracing::warn!(error = ?e, "Failed to delete expired refresh tokens"),
    }
    match auth.db.delete_stale_password_reset_tokens(now).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(count = n, "Deleted stale password reset tokens"),
        Err(e) => tracing::warn!(error = ?e, "Failed to delete stale password reset tokens"),
    }
}
