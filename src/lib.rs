//! bansync - unified ban aggregation for community game servers
//!
//! Periodically pulls moderator-issued bans from every configured
//! upstream, reconciles them against a relational store, and keeps a
//! deduplicated record set for downstream readers.
//!
//! # Architecture
//!
//! - `models`: Canonical data structures (Ban, BanSource, config)
//! - `sources`: Per-upstream adapters (paginated JSON, HTML tables)
//! - `reconcile`: Diff + deletion gate + commit orchestration
//! - `scheduler`: Cron triggers with per-adapter mutual exclusion
//! - `store`: Typed access to the bans / job_bans / ban_sources tables
//! - `utils`: Shared utilities (HTTP client)
//! - `error`: Unified error handling

pub mod config;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod utils;

// Re-export commonly used items
pub use error::{AppError, Result};
