// Authentication and session management
//
// - jwt: access token signing, opaque refresh/reset token generation
// - rotation: session issuance and single-use refresh token rotation
// - middleware: bearer extractor, role guard, client address
// - audit: bounded, single-writer audit recorder
// - rate_limit: sliding-window login limiter
// - password_reset: reset token issuance and redemption

pub mod audit;
pub mod config;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod password_reset;
pub mod rate_limit;
pub mod rotation;
pub mod routes;

pub use audit::AuditRecorder;
pub use config::AuthConfig;
pub use error::AuthError;
pub use middleware::{AuthState, AuthUser, RoleGuard};
pub use rotation::TokenPair;
