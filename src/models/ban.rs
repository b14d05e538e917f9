// src/models/ban.rs

//! Canonical ban record and its identity semantics.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ckey::{canonical_key, canonical_key_opt};

/// Whether a ban covers the whole server or a set of jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BanType {
    Server,
    Job,
}

impl BanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanType::Server => "server",
            BanType::Job => "job",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "server" => Some(BanType::Server),
            "job" => Some(BanType::Job),
            _ => None,
        }
    }
}

/// A canonical ban record.
///
/// Adapters emit these with `source_name` set to one of their declared
/// source names and `id`/`source_id` unset; the reconciler resolves the
/// source against the store and fills in `source_id`. Stored rows carry
/// both ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ban {
    /// Store-assigned primary key; `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Foreign key to the owning `BanSource`; 0 until resolved.
    #[serde(default)]
    pub source_id: i64,

    /// Name of the owning source, as declared by the adapter.
    pub source_name: String,

    /// The upstream's own ban identifier, present iff the source
    /// supports stable IDs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ban_id: Option<i64>,

    /// Canonical player key
    pub ckey: String,

    pub ban_type: BanType,

    /// When the ban was applied (UTC)
    pub banned_on: DateTime<Utc>,

    /// Canonical moderator key
    pub banned_by: String,

    /// Expiry instant (UTC); `None` means permanent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// Free-text reason (empty when the upstream omits it)
    #[serde(default)]
    pub reason: String,

    /// Canonical moderator key that lifted the ban, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unbanned_by: Option<String>,

    /// Banned jobs; non-empty iff `ban_type` is `Job`
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub jobs: BTreeSet<String>,
}

impl Ban {
    /// Canonicalize the player and moderator keys in place.
    pub fn canonicalize(&mut self) {
        self.ckey = canonical_key(&self.ckey);
        self.banned_by = canonical_key(&self.banned_by);
        self.unbanned_by = canonical_key_opt(self.unbanned_by.as_deref());
    }

    /// The identity used to match this ban against another copy of
    /// itself. Sources with stable upstream IDs match on
    /// `(source_id, source_ban_id)`; everything else falls back to the
    /// content tuple.
    pub fn identity(&self, supports_ban_ids: bool) -> BanIdentity {
        match self.source_ban_id {
            Some(source_ban_id) if supports_ban_ids => BanIdentity::BySourceBan {
                source_id: self.source_id,
                source_ban_id,
            },
            _ => BanIdentity::ByContent {
                source_id: self.source_id,
                banned_on: self.banned_on,
                ban_type: self.ban_type,
                ckey: self.ckey.clone(),
                banned_by: self.banned_by.clone(),
                jobs: if self.ban_type == BanType::Job {
                    self.jobs.iter().cloned().collect()
                } else {
                    Vec::new()
                },
            },
        }
    }

    /// Set equality of the job lists.
    pub fn same_jobs(&self, other: &BTreeSet<String>) -> bool {
        self.jobs == *other
    }

    /// Whether the mutable scalar fields differ from `other`.
    pub fn fields_differ(&self, other: &Ban) -> bool {
        self.reason != other.reason
            || self.expires != other.expires
            || self.unbanned_by != other.unbanned_by
    }

    /// Whether the ban is still in force at `now`.
    pub fn active(&self, now: DateTime<Utc>) -> bool {
        self.unbanned_by.is_none() && self.expires.map_or(true, |e| e > now)
    }
}

/// A patch against a stored ban, produced when a fetched copy disagrees
/// with the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanUpdate {
    pub ban_id: i64,
    /// Replacement scalar fields, when any of them changed
    pub fields: Option<FieldPatch>,
    /// Replacement job set, when set-unequal
    pub jobs: Option<BTreeSet<String>>,
}

impl BanUpdate {
    /// Field changes and job-set changes count separately.
    pub fn change_count(&self) -> usize {
        usize::from(self.fields.is_some()) + usize::from(self.jobs.is_some())
    }
}

/// The mutable scalar fields of a ban, overwritten together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPatch {
    pub reason: String,
    pub expires: Option<DateTime<Utc>>,
    pub unbanned_by: Option<String>,
}

/// Identity-equality of a ban.
///
/// Two fetched/stored copies of the same upstream ban compare equal under
/// this relation; it backs both the match phase and the deletion phase of
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BanIdentity {
    BySourceBan {
        source_id: i64,
        source_ban_id: i64,
    },
    ByContent {
        source_id: i64,
        banned_on: DateTime<Utc>,
        ban_type: BanType,
        ckey: String,
        banned_by: String,
        /// Sorted job list; empty for server bans
        jobs: Vec<String>,
    },
}
