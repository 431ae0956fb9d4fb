// Authentication middleware and extractors
// Decision: Bearer access tokens only; verification is stateless (no store lookup)
// Decision: No implicit role hierarchy, every guarded route lists its exact role set

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{AuditAction, AuditEvent, ResetNotifier, Role};

use super::{
    audit::AuditRecorder,
    config::AuthConfig,
    error::AuthError,
    jwt::{JwtService, TokenError},
    password_reset::PasswordResetService,
    rate_limit::LoginRateLimiter,
    rotation::SessionService,
};
use crate::storage::StorageBackend;

/// Authenticated user context extracted from request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

/// Auth state shared across routes
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub jwt_service: Arc<JwtService>,
    pub db: StorageBackend,
    pub sessions: SessionService,
    pub password_reset: PasswordResetService,
    pub audit: AuditRecorder,
    pub rate_limiter: LoginRateLimiter,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        db: StorageBackend,
        audit: AuditRecorder,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
        let sessions = SessionService::new(jwt_service.clone(), db.clone());
        let password_reset = PasswordResetService::new(
            db.clone(),
            notifier,
            config.reset_token_lifetime,
            config.reset_url_base.clone(),
        );
        let rate_limiter = LoginRateLimiter::new(config.login_rate_limit.clone());

        Self {
            config,
            jwt_service,
            db,
            sessions,
            password_reset,
            audit,
            rate_limiter,
        }
    }
}

/// Helper trait for extracting AuthState from application state
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

impl FromRef<AuthState> for AuthState {
    fn from_ref(input: &AuthState) -> Self {
        input.clone()
    }
}

/// Extractor for authenticated user
/// This is required - returns 401 if not authenticated
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already verified by a role guard on this route
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let auth_state = AuthState::from_ref(state);
        authenticate(parts, &auth_state.jwt_service)
    }
}

/// Verify the bearer access token on a request
pub fn authenticate(parts: &Parts, jwt_service: &JwtService) -> Result<AuthUser, AuthError> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthenticated)?;

    let claims = jwt_service
        .validate_access_token(token)
        .map_err(|e| match e {
            TokenError::Expired => AuthError::Expired,
            TokenError::Invalid => AuthError::InvalidToken,
        })?;
    let id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;

    Ok(AuthUser {
        id,
        username: claims.username,
        role: claims.role,
    })
}

/// Role check for an already authenticated user
pub fn authorize(user: &AuthUser, allowed: &[Role]) -> Result<(), AuthError> {
    if user.has_any_role(allowed) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

// ============================================
// Client address
// ============================================

/// Client address used for rate limiting and audit entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_parts(parts: &Parts, trust_proxy_headers: bool) -> Self {
        if trust_proxy_headers {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(ip) = forwarded {
                return Self(ip.to_string());
            }
        }

        match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Self(addr.ip().to_string()),
            None => Self("unknown".to_string()),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        Ok(Self::from_parts(
            parts,
            auth_state.config.trust_proxy_headers,
        ))
    }
}

// ============================================
// Role guard
// ============================================

/// State for `require_roles`: the exact set of roles a route accepts
#[derive(Clone)]
pub struct RoleGuard {
    pub auth: AuthState,
    pub allowed: &'static [Role],
}

impl RoleGuard {
    pub fn new(auth: AuthState, allowed: &'static [Role]) -> Self {
        Self { auth, allowed }
    }
}

/// Route layer: authenticate, check the role set, audit denials.
/// Use with `axum::middleware::from_fn_with_state(RoleGuard::new(..), require_roles)`.
pub async fn require_roles(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();
    let user = authenticate(&parts, &guard.auth.jwt_service)?;

    if let Err(e) = authorize(&user, guard.allowed) {
        let ip = ClientIp::from_parts(&parts, guard.auth.config.trust_proxy_headers);
        let required: Vec<&str> = guard.allowed.iter().map(Role::as_str).collect();
        tracing::info!(
            user_id = %user.id,
            role = %user.role,
            path = %parts.uri.path(),
            "Access denied"
        );
        guard.auth.audit.record(
            AuditEvent::failure(AuditAction::ForbiddenAccess)
                .user(user.id, user.username)
                .ip(ip.0)
                .meta("method", parts.method.as_str())
                .meta("path", parts.uri.path())
                .meta("role", user.role.as_str())
                .meta("requiredRoles", required),
        );
        return Err(e);
    }

    parts.extensions.insert(user);
    Ok(next.run(Request::from_parts(parts, body)).await)
}
