//! HTTP API handlers for taspa-logs

pub mod auth;
pub mod health;
pub mod ingest;
pub mod stream;

pub use auth::require_any_role;
pub use health::health_routes;
pub use ingest::{broadcast_log, ingest_log, job_history};
pub use stream::log_stream;
