// Users API routes
// Decision: Only admins list accounts or change roles; role changes are audited
// Decision: Changing a role does not revoke sessions, the next refresh picks up the new role

use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vigil_core::{AuditAction, AuditEvent, Role};

use super::common::ListResponse;
use super::validation::{parse_role, ValidJson};
use crate::auth::{
    middleware::{require_roles, AuthState, AuthUser, ClientIp, FromRef, RoleGuard},
    routes::detached,
    AuthError,
};
use crate::storage::UserRow;

const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// App state for users routes
#[derive(Clone)]
pub struct UsersState {
    pub auth: AuthState,
}

impl FromRef<UsersState> for AuthState {
    fn from_ref(input: &UsersState) -> Self {
        input.auth.clone()
    }
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role()?,
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    /// One of: user, commander, admin
    pub role: String,
}

/// Create users routes
pub fn routes(state: UsersState) -> Router {
    let guard = RoleGuard::new(state.auth.clone(), ADMIN_ONLY);

    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/role", patch(update_user_role))
        .route_layer(middleware::from_fn_with_state(guard, require_roles))
        .with_state(state)
}

/// GET /api/admin/users - List all users
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "List of users", body = ListResponse<User>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<UsersState>,
) -> Result<Json<ListResponse<User>>, AuthError> {
    let users = state
        .auth
        .db
        .list_users()
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(ListResponse::new(users)))
}

/// PATCH /api/admin/users/{id}/role - Change a user's role
#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Invalid role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user_role(
    State(state): State<UsersState>,
    admin: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateRoleRequest>,
) -> Result<Json<User>, AuthError> {
    let role = parse_role(&req.role)?;
    detached(change_role(state, admin, ip, id, role)).await
}

async fn change_role(
    state: UsersState,
    admin: AuthUser,
    ip: String,
    id: Uuid,
    role: Role,
) -> Result<Json<User>, AuthError> {

    let previous = state
        .auth
        .db
        .get_user(id)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    let updated = state
        .auth
        .db
        .update_user_role(id, role)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %updated.id,
        from = %previous.role,
        to = %role,
        "User role changed"
    );
    state.auth.audit.record(
        AuditEvent::success(AuditAction::RoleChanged)
            .user(admin.id, admin.username)
            .ip(ip)
            .meta("targetUserId", updated.id.to_string())
            .meta("targetUsername", updated.username.as_str())
            .meta("from", previous.role.as_str())
            .meta("to", role.as_str()),
    );

    Ok(Json(User::try_from(updated)?))
}
