//! Shared HTTP API building blocks
//!
//! Contains ONLY framework-independent pieces: role parsing and checks, viewer
//! token validation, and request/response types shared by several services.
//! Each service wraps these with its own axum extractors and error responses.

pub mod jwt;
pub mod roles;
pub mod types;

pub use jwt::{Claims, TokenError, TokenVerifier};
pub use roles::{require_any, AuthError, Role, RoleSet, ROLES_HEADER};
pub use types::{HealthResponse, PlatformConfig, PlatformConfigUpdate};
