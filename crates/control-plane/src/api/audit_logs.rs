// Audit log API routes
// Decision: Commanders and admins can read the log; nobody can write to it over HTTP

use axum::{
    extract::{Query, State},
    middleware,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vigil_core::{AuditAction, Role};

use super::common::ListResponse;
use crate::auth::{
    middleware::{require_roles, AuthState, FromRef, RoleGuard},
    AuthError,
};
use crate::storage::{AuditLogFilter, AuditLogRow};

const AUDIT_READERS: &[Role] = &[Role::Commander, Role::Admin];

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 500;

/// App state for audit log routes
#[derive(Clone)]
pub struct AuditLogsState {
    pub auth: AuthState,
}

impl FromRef<AuditLogsState> for AuthState {
    fn from_ref(input: &AuditLogsState) -> Self {
        input.auth.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub success: bool,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditLogEntry {
    fn from(row: AuditLogRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            action: row.action,
            metadata: row.metadata,
            success: row.success,
            ip: row.ip,
            created_at: row.created_at,
        }
    }
}

/// Query parameters for listing audit entries
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListAuditLogsQuery {
    /// Maximum entries to return (1-500, default 100)
    pub limit: Option<i64>,
    pub user_id: Option<Uuid>,
    /// Action name, e.g. LOGIN_FAILED
    pub action: Option<String>,
}

impl ListAuditLogsQuery {
    fn into_filter(self) -> Result<AuditLogFilter, AuthError> {
        let action = self
            .action
            .filter(|a| !a.trim().is_empty())
            .map(|a| {
                a.parse::<AuditAction>()
                    .map(|action| action.as_str().to_string())
                    .map_err(|e| AuthError::validation(e.to_string()))
            })
            .transpose()?;

        Ok(AuditLogFilter {
            user_id: self.user_id,
            action,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        })
    }
}

/// Create audit log routes
pub fn routes(state: AuditLogsState) -> Router {
    let guard = RoleGuard::new(state.auth.clone(), AUDIT_READERS);

    Router::new()
        .route("/api/audit-logs", get(list_audit_logs))
        .route_layer(middleware::from_fn_with_state(guard, require_roles))
        .with_state(state)
}

/// GET /api/audit-logs - List audit entries, newest first
#[utoipa::path(
    get,
    path = "/api/audit-logs",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum entries (1-500, default 100)"),
        ("userId" = Option<Uuid>, Query, description = "Only entries for this user"),
        ("action" = Option<String>, Query, description = "Only entries with this action")
    ),
    responses(
        (status = 200, description = "Audit entries", body = ListResponse<AuditLogEntry>),
        (status = 400, description = "Unknown action"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Commander or admin role required")
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn list_audit_logs(
    State(state): State<AuditLogsState>,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<Json<ListResponse<AuditLogEntry>>, AuthError> {
    let filter = query.into_filter()?;
    let rows = state.auth.db.list_audit_logs(&filter).await?;

    Ok(Json(ListResponse::new(
        rows.into_iter().map(AuditLogEntry::from).collect(),
    )))
}
