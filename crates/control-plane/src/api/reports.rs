// Report classification API routes
// Decision: The control plane only forwards text to the classifier and returns its verdict;
// reports are not stored

use axum::{extract::State, middleware, routing::post, Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use vigil_core::{Classification, ClassifierClient, ClassifierError, Role};

use super::validation::{validate_report_text, ValidJson};
use crate::auth::{
    middleware::{require_roles, AuthState, AuthUser, FromRef, RoleGuard},
    AuthError,
};

const REPORT_SUBMITTERS: &[Role] = &[Role::User, Role::Commander, Role::Admin];

/// App state for report routes
#[derive(Clone)]
pub struct ReportsState {
    pub auth: AuthState,
    pub classifier: ClassifierClient,
}

impl FromRef<ReportsState> for AuthState {
    fn from_ref(input: &ReportsState) -> Self {
        input.auth.clone()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClassifyReportRequest {
    /// Report text (already extracted from any attachment)
    pub text: String,
}

/// Create report routes
pub fn routes(state: ReportsState) -> Router {
    let guard = RoleGuard::new(state.auth.clone(), REPORT_SUBMITTERS);

    Router::new()
        .route("/api/reports/classify", post(classify_report))
        .route_layer(middleware::from_fn_with_state(guard, require_roles))
        .with_state(state)
}

/// POST /api/reports/classify - Classify a report's text
#[utoipa::path(
    post,
    path = "/api/reports/classify",
    request_body = ClassifyReportRequest,
    responses(
        (status = 200, description = "Classification", body = Classification),
        (status = 400, description = "Empty or oversized text"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Classifier unavailable")
    ),
    security(("bearer" = [])),
    tag = "reports"
)]
pub async fn classify_report(
    State(state): State<ReportsState>,
    user: AuthUser,
    ValidJson(req): ValidJson<ClassifyReportRequest>,
) -> Result<Json<Classification>, AuthError> {
    validate_report_text(&req.text)?;

    let classification = state
        .classifier
        .classify(&req.text)
        .await
        .map_err(|e| match e {
            ClassifierError::EmptyText => AuthError::validation("Report text must not be empty"),
            other => AuthError::Upstream(other.to_string()),
        })?;

    tracing::info!(
        user_id = %user.id,
        label = ?classification.label,
        confidence = classification.confidence,
        "Report classified"
    );

    Ok(Json(classification))
}
