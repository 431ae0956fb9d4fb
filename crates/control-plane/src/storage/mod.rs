// Storage layer for the Vigil control plane
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// Tables: users, refresh_tokens, password_reset_tokens, audit_logs.
// Schema lives in crates/control-plane/migrations.

pub mod backend;
pub mod memory;
pub mod models;
pub mod password;
pub mod repositories;

pub use backend::StorageBackend;
pub use memory::InMemoryDatabase;
pub use models::*;
pub use repositories::Database;
