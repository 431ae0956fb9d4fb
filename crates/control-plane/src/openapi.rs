// OpenAPI specification generation
//
// This module defines the OpenAPI spec for the Vigil API.
// It can be used by both the main API server (for Swagger UI)
// and the export-openapi binary (for static spec generation).

use crate::api::{self, ErrorResponse, ListResponse, MessageResponse};
use crate::auth::{self, TokenPair};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use vigil_core::{Classification, Role, ThreatLabel};

/// Registers the bearer scheme referenced by guarded routes
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation for the Vigil API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        auth::routes::register,
        auth::routes::login,
        auth::routes::refresh_token,
        auth::routes::logout,
        auth::routes::request_password_reset,
        auth::routes::reset_password,
        auth::routes::get_current_user,
        api::users::list_users,
        api::users::update_user_role,
        api::audit_logs::list_audit_logs,
        api::reports::classify_report,
    ),
    components(
        schemas(
            Role, Classification, ThreatLabel,
            ErrorResponse, MessageResponse, TokenPair,
            api::health::HealthResponse,
            auth::routes::RegisterRequest, auth::routes::RegisterResponse,
            auth::routes::LoginRequest, auth::routes::LoginResponse,
            auth::routes::RefreshTokenRequest,
            auth::routes::RequestPasswordResetRequest, auth::routes::ResetPasswordRequest,
            api::users::User, api::users::UpdateRoleRequest,
            ListResponse<api::users::User>,
            api::audit_logs::AuditLogEntry,
            ListResponse<api::audit_logs::AuditLogEntry>,
            api::reports::ClassifyReportRequest,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Registration, login, token refresh and password reset"),
        (name = "users", description = "Account administration"),
        (name = "audit", description = "Security audit log"),
        (name = "reports", description = "Report classification")
    ),
    info(
        title = "Vigil API",
        version = "0.1.0",
        description = "Role-based dashboard backend: authentication, sessions, audit log and report classification",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}
