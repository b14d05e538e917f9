// src/store/models.rs

//! Row types for the relational store.
//!
//! Instants are persisted as UTC epoch seconds; the conversions back to
//! `DateTime<Utc>` live here so the rest of the crate only ever sees
//! timezone-tagged values.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::{AppError, Result};
use crate::models::{Ban, BanSource, BanType};

/// A `ban_sources` row.
#[derive(Debug, Clone, FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
}

impl From<SourceRow> for BanSource {
    fn from(row: SourceRow) -> Self {
        BanSource::new(row.id, row.name)
    }
}

/// A `bans` row joined with its source name.
#[derive(Debug, Clone, FromRow)]
pub struct BanRow {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub source_ban_id: Option<i64>,
    pub ckey: String,
    pub ban_type: String,
    pub banned_on: i64,
    pub banned_by: String,
    pub expires: Option<i64>,
    pub reason: String,
    pub unbanned_by: Option<String>,
}

/// A `job_bans` row.
#[derive(Debug, Clone, FromRow)]
pub struct JobBanRow {
    pub ban_id: i64,
    pub job: String,
}

impl BanRow {
    /// Rehydrate the canonical record, attaching its job set.
    pub fn into_ban(self, jobs: BTreeSet<String>) -> Result<Ban> {
        let ban_type = BanType::parse(&self.ban_type).ok_or_else(|| {
            AppError::validation(format!("ban {} has unknown ban_type '{}'", self.id, self.ban_type))
        })?;
        Ok(Ban {
            id: Some(self.id),
            source_id: self.source_id,
            source_name: self.source_name,
            source_ban_id: self.source_ban_id,
            ckey: self.ckey,
            ban_type,
            banned_on: instant_from_epoch(self.banned_on, self.id)?,
            banned_by: self.banned_by,
            expires: self
                .expires
                .map(|e| instant_from_epoch(e, self.id))
                .transpose()?,
            reason: self.reason,
            unbanned_by: self.unbanned_by,
            jobs,
        })
    }
}

/// Epoch seconds for the persisted form of an instant.
pub fn epoch_from_instant(instant: DateTime<Utc>) -> i64 {
    instant.timestamp()
}

fn instant_from_epoch(secs: i64, ban_id: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AppError::validation(format!("ban {ban_id} has out-of-range instant {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_row() -> BanRow {
        BanRow {
            id: 3,
            source_id: 1,
            source_name: "example".to_string(),
            source_ban_id: Some(7),
            ckey: "alice".to_string(),
            ban_type: "job".to_string(),
            banned_on: 1_700_000_000,
            banned_by: "mod1".to_string(),
            expires: None,
            reason: "metagaming".to_string(),
            unbanned_by: None,
        }
    }

    #[test]
    fn test_into_ban_round_trips_instants() {
        let jobs: BTreeSet<String> = ["Captain".to_string()].into_iter().collect();
        let ban = sample_row().into_ban(jobs.clone()).unwrap();
        assert_eq!(ban.id, Some(3));
        assert_eq!(ban.ban_type, BanType::Job);
        assert_eq!(ban.jobs, jobs);
        assert_eq!(epoch_from_instant(ban.banned_on), 1_700_000_000);
        assert_eq!(
            ban.banned_on,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_ban_type_is_rejected() {
        let mut row = sample_row();
        row.ban_type = "temporary".to_string();
        assert!(row.into_ban(BTreeSet::new()).is_err());
    }
}
