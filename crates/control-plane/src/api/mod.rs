// HTTP API routes
//
// This module contains all HTTP route handlers for the public API.
// Each submodule handles a specific resource type with its own state.
// Authentication routes live in crate::auth::routes.

pub mod audit_logs;
pub mod common;
pub mod health;
pub mod reports;
pub mod users;
pub mod validation;

// Re-export common types
pub use common::{ErrorResponse, ListResponse, MessageResponse};
