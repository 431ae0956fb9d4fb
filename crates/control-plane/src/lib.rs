// Vigil Control Plane Library
// Decision: Shared library for binaries (API server, OpenAPI export) and integration tests

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Router assembly and background maintenance
pub mod app;

// Authentication module
pub mod auth;

// Client with refresh-token coalescing
pub mod client;

// Storage layer
pub mod storage;

// OpenAPI spec generation
pub mod openapi;

pub use app::build_router;
