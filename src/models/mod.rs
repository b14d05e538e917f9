//! Domain models for the aggregation engine.
//!
//! This module contains all data structures used throughout the
//! application, organized by their primary purpose.

mod ban;
mod ckey;
mod config;
mod source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-export all public types
pub use ban::{Ban, BanIdentity, BanType, BanUpdate, FieldPatch};
pub use ckey::{canonical_key, canonical_key_opt};
pub use config::{
    AppConfig, DbConfig, DbDialect, HttpConfig, SchedulerConfig, SourceConfig, SourceKind,
};
pub use source::BanSource;

/// How a reconciliation pass was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshKind {
    /// Inserts and updates only; deletions never applied.
    Incremental,
    /// Deletions permitted, subject to the safety gate.
    Complete,
}

impl RefreshKind {
    pub fn is_complete(&self) -> bool {
        matches!(self, RefreshKind::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshKind::Incremental => "incremental",
            RefreshKind::Complete => "complete",
        }
    }
}

/// Statistics for one reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub adapter: String,
    pub refresh: RefreshKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub fetched: usize,
    pub stored: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub duplicates: usize,
    /// Set when the source was unreachable and the job bailed without
    /// touching the store.
    pub skipped: bool,
}

impl ReconcileStats {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated + self.deleted > 0
    }
}
