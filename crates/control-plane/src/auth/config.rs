// Authentication configuration loaded from environment variables.
// Decision: AUTH_ prefix for all auth config
// Decision: Durations are given in seconds

use std::time::Duration;

/// JWT / token lifetime configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for signing access tokens
    pub secret: String,
    /// Access token lifetime
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    pub refresh_token_lifetime: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_token_lifetime: Duration::from_secs(15 * 60), // 15 minutes
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
        }
    }
}

/// Login rate limit configuration
#[derive(Debug, Clone)]
pub struct LoginRateLimitConfig {
    /// Maximum attempts per window per client
    pub max_attempts: usize,
    /// Sliding window length
    pub window: Duration,
}

impl Default for LoginRateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(5 * 60),
        }
    }
}

/// Complete authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Password reset token lifetime
    pub reset_token_lifetime: Duration,
    /// Base URL of the reset page; the token is appended as `?token=`
    pub reset_url_base: String,
    /// Login rate limiting
    pub login_rate_limit: LoginRateLimitConfig,
    /// Maximum queued audit events before new ones are dropped
    pub audit_queue_capacity: usize,
    /// Whether to disable signup (registration)
    pub disable_signup: bool,
    /// Trust X-Forwarded-For for the client address (only behind a proxy)
    pub trust_proxy_headers: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt: JwtConfig::default(),
            reset_token_lifetime: Duration::from_secs(60 * 60), // 1 hour
            reset_url_base: "http://localhost:3000/reset-password".to_string(),
            login_rate_limit: LoginRateLimitConfig::default(),
            audit_queue_capacity: 1024,
            disable_signup: false,
            trust_proxy_headers: false,
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|s| s.to_lowercase() == "true" || s == "1")
        .unwrap_or(false)
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secret = std::env::var("AUTH_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!(
                    "AUTH_JWT_SECRET not set, using a random secret (tokens will not survive restarts)"
                );
                use rand::Rng;
                let bytes: [u8; 32] = rand::thread_rng().gen();
                hex::encode(bytes)
            });

        let jwt = JwtConfig {
            secret,
            access_token_lifetime: env_secs("AUTH_ACCESS_TOKEN_LIFETIME")
                .unwrap_or(defaults.jwt.access_token_lifetime),
            refresh_token_lifetime: env_secs("AUTH_REFRESH_TOKEN_LIFETIME")
                .unwrap_or(defaults.jwt.refresh_token_lifetime),
        };

        let login_rate_limit = LoginRateLimitConfig {
            max_attempts: std::env::var("AUTH_LOGIN_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.login_rate_limit.max_attempts),
            window: env_secs("AUTH_LOGIN_WINDOW").unwrap_or(defaults.login_rate_limit.window),
        };

        Self {
            jwt,
            reset_token_lifetime: env_secs("AUTH_RESET_TOKEN_LIFETIME")
                .unwrap_or(defaults.reset_token_lifetime),
            reset_url_base: std::env::var("AUTH_RESET_URL_BASE")
                .unwrap_or(defaults.reset_url_base),
            login_rate_limit,
            audit_queue_capacity: std::env::var("AUTH_AUDIT_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.audit_queue_capacity),
            disable_signup: env_flag("AUTH_DISABLE_SIGNUP"),
            trust_proxy_headers: env_flag("AUTH_TRUST_PROXY_HEADERS"),
        }
    }

    /// Configuration for tests: fixed secret, default lifetimes
    pub fn for_tests() -> Self {
        Self {
            jwt: JwtConfig {
                secret: "test-secret-key-for-testing".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
