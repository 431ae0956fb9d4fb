// Vigil core
//
// Storage-agnostic domain types shared by the control plane and its clients:
// - Role: closed set of user roles (no implicit hierarchy)
// - AuditAction / AuditEvent: security-relevant events recorded by the control plane
// - ResetNotifier: seam for delivering password-reset links
// - ClassifierClient: HTTP client for the external report classifier

pub mod audit;
pub mod classifier;
pub mod notifier;
pub mod role;

// Telemetry (tracing-subscriber initialization)
pub mod telemetry;

pub use audit::{AuditAction, AuditEvent, UnknownAuditAction};
pub use classifier::{Classification, ClassifierClient, ClassifierError, ThreatLabel};
pub use notifier::{LogNotifier, MemoryNotifier, ResetNotice, ResetNotifier};
pub use role::{Role, UnknownRole};
