//! Entity store access
//!
//! All TASPA processes share one SQLite database. Every write path that can
//! race with another process uses `INSERT ... ON CONFLICT` instead of
//! read-then-write.

pub mod directions;
pub mod entities;
pub mod init;
pub mod jobs;
pub mod logs;
pub mod models;

pub use init::{create_schema, init_database, open_in_memory};
pub use models::{Job, JobStatus, LogRecord};

/// Upper bound on bind parameters per statement
///
/// SQLite's compiled limit is 32766; staying below it leaves room for the
/// few extra binds a statement adds outside its VALUES list.
pub const MAX_BIND_PARAMS: usize = 32_000;

/// Rows per multi-row INSERT for a statement binding `binds_per_row` values
pub fn rows_per_statement(binds_per_row: usize) -> usize {
    (MAX_BIND_PARAMS / binds_per_row.max(1)).max(1)
}
