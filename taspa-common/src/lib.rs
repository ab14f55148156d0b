//! # TASPA Common Library
//!
//! Shared code for the TASPA scraping services:
//! - Entity store schema and queries (jobs, directions, sources, entities, logs)
//! - Platform catalogue
//! - Job announcement broker (in-memory and NATS JetStream backends)
//! - Wire types shared between orchestrator, workers and the log service
//! - Role and token authorization helpers
//! - Bootstrap configuration loading

pub mod api;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod platform;
pub mod time;

pub use error::{Error, Result};
pub use platform::Platform;
