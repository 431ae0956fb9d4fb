// Authentication HTTP routes
// Decision: Use /api/auth/* prefix for all auth endpoints
// Decision: Tokens travel in JSON bodies only (no cookies)
// Decision: Every request handled here records exactly one audit event

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use utoipa::ToSchema;
use vigil_core::{AuditAction, AuditEvent, Role};

use super::{
    error::AuthError,
    middleware::{AuthState, AuthUser, ClientIp},
    password_reset::ResetRequestOutcome,
    rate_limit::RateLimitDecision,
    rotation::{RefreshError, TokenPair},
};
use crate::api::{
    common::MessageResponse,
    users::User,
    validation::{parse_role, validate_password, validate_username, ValidJson},
};
use crate::storage::{
    models::{CreateUserRow, DuplicateUsername},
    password::{hash_password, verify_against_dummy, verify_password},
};

const RESET_REQUESTED_MESSAGE: &str =
    "If the account exists, a password reset link has been sent";

/// Register request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// One of: user, commander, admin
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub user: User,
}

/// Login request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Dashboard the user is signing in to; must match the account role when given
    #[serde(default)]
    pub role_requested: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: User,
}

/// Refresh token request (also used by logout)
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestPasswordResetRequest {
    pub username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Create auth routes
pub fn routes(state: AuthState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh_token))
        .route("/api/auth/logout", post(logout))
        .route(
            "/api/auth/request-password-reset",
            post(request_password_reset),
        )
        .route("/api/auth/reset-password", post(reset_password))
        .route("/api/auth/me", get(get_current_user))
        .with_state(state)
}

/// Run a handler's state-changing part on its own task.
///
/// A client disconnect drops the handler future but not the spawned flow, which
/// still reaches its audit record.
pub(crate) async fn detached<T, F>(flow: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(flow).await {
        Ok(result) => result,
        Err(e) => Err(AuthError::Server(anyhow::anyhow!("auth task failed: {e}"))),
    }
}

/// Record `event` with the failure reason, then hand back the error
fn audited(state: &AuthState, event: AuditEvent, error: AuthError) -> AuthError {
    let reason = match &error {
        AuthError::Server(_) => "server_error",
        other => other.code(),
    };
    state.audit.record(event.meta("reason", reason));
    error
}

/// POST /api/auth/register - Create an account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid input", body = crate::api::ErrorResponse),
        (status = 403, description = "Registration disabled", body = crate::api::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::api::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AuthState>,
    ClientIp(ip): ClientIp,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    detached(register_flow(state, ip, req)).await
}

async fn register_flow(
    state: AuthState,
    ip: String,
    req: RegisterRequest,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let failed = AuditEvent::failure(AuditAction::RegisterFailed)
        .username(req.username.as_str())
        .ip(ip.as_str());

    if state.config.disable_signup {
        return Err(audited(&state, failed, AuthError::SignupDisabled));
    }

    let role = validate_username(&req.username)
        .and_then(|_| validate_password(&req.password))
        .and_then(|_| parse_role(&req.role))
        .map_err(|e| audited(&state, failed.clone(), e))?;

    let password_hash =
        hash_password(&req.password).map_err(|e| audited(&state, failed.clone(), e.into()))?;

    let user = match state
        .db
        .create_user(CreateUserRow {
            username: req.username.clone(),
            password_hash,
            role,
        })
        .await
    {
        Ok(user) => user,
        Err(e) if e.downcast_ref::<DuplicateUsername>().is_some() => {
            return Err(audited(&state, failed, AuthError::DuplicateUsername));
        }
        Err(e) => return Err(audited(&state, failed, e.into())),
    };

    tracing::info!(user_id = %user.id, role = %role, "User registered");
    state.audit.record(
        AuditEvent::success(AuditAction::Register)
            .user(user.id, user.username.as_str())
            .ip(ip)
            .meta("role", role.as_str()),
    );

    let user = User::try_from(user)?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user })))
}

/// POST /api/auth/login - Login with username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::api::ErrorResponse),
        (status = 403, description = "Role mismatch", body = crate::api::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::api::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AuthState>,
    ClientIp(ip): ClientIp,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    detached(login_flow(state, ip, req)).await
}

async fn login_flow(
    state: AuthState,
    ip: String,
    req: LoginRequest,
) -> Result<Json<LoginResponse>, AuthError> {
    if let RateLimitDecision::Limited { retry_after } = state.rate_limiter.check(&ip) {
        tracing::warn!(ip = %ip, "Login rate limit exceeded");
        state.audit.record(
            AuditEvent::failure(AuditAction::LoginRateLimited)
                .username(req.username.as_str())
                .ip(ip.as_str())
                .meta("retryAfterSecs", retry_after.as_secs()),
        );
        return Err(AuthError::RateLimited { retry_after });
    }

    let failed = AuditEvent::failure(AuditAction::LoginFailed)
        .username(req.username.as_str())
        .ip(ip.as_str());

    let requested: Option<Role> = req
        .role_requested
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(parse_role)
        .transpose()
        .map_err(|e| audited(&state, failed.clone(), e))?;

    let user = state
        .db
        .get_user_by_username(&req.username)
        .await
        .map_err(|e| audited(&state, failed.clone(), e.into()))?;

    let Some(user) = user else {
        verify_against_dummy(&req.password);
        return Err(audited(&state, failed, AuthError::InvalidCredentials));
    };

    let failed = failed.user_id(user.id);
    let valid = verify_password(&req.password, &user.password_hash)
        .map_err(|e| audited(&state, failed.clone(), e.into()))?;
    if !valid {
        return Err(audited(&state, failed, AuthError::InvalidCredentials));
    }

    let role = user
        .role()
        .map_err(|e| audited(&state, failed.clone(), e.into()))?;

    if let Some(requested) = requested {
        if requested != role {
            state.audit.record(
                AuditEvent::failure(AuditAction::LoginRoleMismatch)
                    .user(user.id, user.username.as_str())
                    .ip(ip.as_str())
                    .meta("role", role.as_str())
                    .meta("roleRequested", requested.as_str()),
            );
            return Err(AuthError::RoleMismatch);
        }
    }

    let tokens = state
        .sessions
        .issue_session(&user)
        .await
        .map_err(|e| audited(&state, failed.clone(), e.into()))?;

    tracing::info!(user_id = %user.id, "User logged in");
    state.audit.record(
        AuditEvent::success(AuditAction::LoginSuccess)
            .user(user.id, user.username.as_str())
            .ip(ip)
            .meta("role", role.as_str()),
    );

    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: tokens.token_type,
        expires_in: tokens.expires_in,
        user: User::try_from(user)?,
    }))
}

/// POST /api/auth/refresh - Rotate a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid, revoked or expired refresh token", body = crate::api::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AuthState>,
    ClientIp(ip): ClientIp,
    ValidJson(req): ValidJson<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    detached(refresh_token_flow(state, ip, req)).await
}

async fn refresh_token_flow(
    state: AuthState,
    ip: String,
    req: RefreshTokenRequest,
) -> Result<Json<TokenPair>, AuthError> {
    match state.sessions.refresh(&req.refresh_token).await {
        Ok(session) => {
            state.audit.record(
                AuditEvent::success(AuditAction::RefreshSuccess)
                    .user(session.user.id, session.user.username.as_str())
                    .ip(ip),
            );
            Ok(Json(session.tokens))
        }
        Err(RefreshError::Invalid) => Err(audited(
            &state,
            AuditEvent::failure(AuditAction::RefreshInvalid).ip(ip),
            AuthError::InvalidToken,
        )),
        Err(RefreshError::Replay { user_id }) => {
            tracing::warn!(user_id = %user_id, ip = %ip, "Revoked refresh token presented");
            Err(audited(
                &state,
                AuditEvent::failure(AuditAction::RefreshReplay)
                    .user_id(user_id)
                    .ip(ip),
                AuthError::InvalidToken,
            ))
        }
        Err(RefreshError::Expired { user_id }) => Err(audited(
            &state,
            AuditEvent::failure(AuditAction::RefreshExpired)
                .user_id(user_id)
                .ip(ip),
            AuthError::Expired,
        )),
        Err(RefreshError::Server(e)) => Err(audited(
            &state,
            AuditEvent::failure(AuditAction::RefreshInvalid).ip(ip),
            e.into(),
        )),
    }
}

/// POST /api/auth/logout - Revoke a refresh token
///
/// Idempotent: unknown or already revoked tokens are acknowledged the same way.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AuthState>,
    ClientIp(ip): ClientIp,
    ValidJson(req): ValidJson<RefreshTokenRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    detached(logout_flow(state, ip, req)).await
}

async fn logout_flow(
    state: AuthState,
    ip: String,
    req: RefreshTokenRequest,
) -> Result<Json<MessageResponse>, AuthError> {
    let event = AuditEvent::success(AuditAction::Logout).ip(ip.as_str());

    let revoked = state
        .sessions
        .revoke(&req.refresh_token)
        .await
        .map_err(|e| {
            audited(
                &state,
                AuditEvent::failure(AuditAction::Logout).ip(ip.as_str()),
                e.into(),
            )
        })?;

    let event = match revoked {
        Some(token) => event.user_id(token.user_id).meta("known", true),
        None => event.meta("known", false),
    };
    state.audit.record(event);

    Ok(Json(MessageResponse::new("Logged out")))
}

/// POST /api/auth/request-password-reset - Send a reset link
///
/// Always answers with the same message so the response does not reveal
/// whether the account exists.
#[utoipa::path(
    post,
    path = "/api/auth/request-password-reset",
    request_body = RequestPasswordResetRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    State(state): State<AuthState>,
    ClientIp(ip): ClientIp,
    ValidJson(req): ValidJson<RequestPasswordResetRequest>,
) -> Json<MessageResponse> {
    let flow = async move {
        request_password_reset_flow(state, ip, req).await;
        Ok::<_, AuthError>(())
    };
    if let Err(e) = detached(flow).await {
        tracing::error!(error = ?e, "Password reset request task failed");
    }
    Json(MessageResponse::new(RESET_REQUESTED_MESSAGE))
}

async fn request_password_reset_flow(
    state: AuthState,
    ip: String,
    req: RequestPasswordResetRequest,
) {
    let event = AuditEvent::success(AuditAction::PasswordResetRequested)
        .username(req.username.as_str())
        .ip(ip);

    let event = match state.password_reset.request_reset(&req.username).await {
        Ok(ResetRequestOutcome::Issued { user_id, .. }) => event.user_id(user_id),
        Ok(ResetRequestOutcome::UnknownUser) => AuditEvent {
            success: false,
            ..event.meta("reason", "unknown_user")
        },
        Err(e) => {
            tracing::error!(error = ?e, "Failed to issue password reset token");
            AuditEvent {
                success: false,
                ..event.meta("reason", "server_error")
            }
        }
    };
    state.audit.record(event);
}

/// POST /api/auth/reset-password - Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = crate::api::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AuthState>,
    ClientIp(ip): ClientIp,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    detached(reset_password_flow(state, ip, req)).await
}

async fn reset_password_flow(
    state: AuthState,
    ip: String,
    req: ResetPasswordRequest,
) -> Result<Json<MessageResponse>, AuthError> {
    let failed = AuditEvent::failure(AuditAction::PasswordResetFailed).ip(ip.as_str());

    validate_password(&req.new_password).map_err(|e| audited(&state, failed.clone(), e))?;

    let user = state
        .password_reset
        .complete_reset(&req.token, &req.new_password)
        .await
        .map_err(|e| audited(&state, failed.clone(), e.into()))?
        .ok_or_else(|| audited(&state, failed, AuthError::InvalidOrExpiredToken))?;

    tracing::info!(user_id = %user.id, "Password reset completed");
    state.audit.record(
        AuditEvent::success(AuditAction::PasswordResetCompleted)
            .user(user.id, user.username.as_str())
            .ip(ip),
    );

    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// GET /api/auth/me - Get current user info
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Unauthorized", body = crate::api::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn get_current_user(
    State(state): State<AuthState>,
    user: AuthUser,
) -> Result<Json<User>, AuthError> {
    let row = state
        .db
        .get_user(user.id)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    Ok(Json(User::try_from(row)?))
}
