//! Diff calculation between stored and fetched bans.
//!
//! Computes the minimal set of inserts, field updates, and (on complete
//! refresh) deletion candidates for one adapter's batch. Pure: the
//! commit happens in the store gateway.

use std::collections::{HashMap, HashSet};

use crate::models::{Ban, BanIdentity, BanType, BanUpdate, FieldPatch};

/// The changes one reconciliation pass wants to commit.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Fetched bans with no stored counterpart
    pub inserts: Vec<Ban>,
    /// Patches against stored bans whose mutable state drifted
    pub updates: Vec<BanUpdate>,
    /// Stored bans the upstream no longer lists (complete refresh only);
    /// subject to the deletion gate before anything is removed
    pub stale: Vec<Ban>,
    /// Fetched bans discarded because a later fetched ban had the same
    /// identity (last one wins)
    pub duplicates: usize,
    /// Size of the fetched batch after dedup
    pub fetched_count: usize,
}

impl ChangeSet {
    /// Total updates, counting field changes and job-set changes
    /// separately.
    pub fn update_count(&self) -> usize {
        self.updates.iter().map(BanUpdate::change_count).sum()
    }

    pub fn has_changes(&self) -> bool {
        !self.inserts.is_empty() || !self.updates.is_empty() || !self.stale.is_empty()
    }
}

/// Diff `fetched` against `stored` under the adapter's identity
/// relation.
///
/// `stored` rows must carry store ids; `fetched` must already be
/// canonicalized with `source_id` resolved.
pub fn compute(
    stored: &[Ban],
    fetched: Vec<Ban>,
    supports_ban_ids: bool,
    complete_refresh: bool,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    // Last occurrence wins on duplicate upstream identities.
    let mut index: HashMap<BanIdentity, usize> = HashMap::new();
    let mut winners: Vec<(BanIdentity, Ban)> = Vec::new();
    for ban in fetched {
        let identity = ban.identity(supports_ban_ids);
        match index.get(&identity) {
            Some(&i) => {
                winners[i].1 = ban;
                changes.duplicates += 1;
            }
            None => {
                index.insert(identity.clone(), winners.len());
                winners.push((identity, ban));
            }
        }
    }
    changes.fetched_count = winners.len();

    let stored_by_identity: HashMap<BanIdentity, &Ban> = stored
        .iter()
        .map(|ban| (ban.identity(supports_ban_ids), ban))
        .collect();

    let mut seen: HashSet<BanIdentity> = HashSet::with_capacity(winners.len());
    for (identity, ban) in winners {
        seen.insert(identity.clone());
        let Some(matched) = stored_by_identity.get(&identity) else {
            changes.inserts.push(ban);
            continue;
        };
        let Some(ban_id) = matched.id else {
            // Stored rows always carry ids; tolerate rather than panic.
            continue;
        };

        let fields = matched.fields_differ(&ban).then(|| FieldPatch {
            reason: ban.reason.clone(),
            expires: ban.expires,
            unbanned_by: ban.unbanned_by.clone(),
        });
        let jobs = (ban.ban_type == BanType::Job && !matched.same_jobs(&ban.jobs))
            .then(|| ban.jobs.clone());

        if fields.is_some() || jobs.is_some() {
            changes.updates.push(BanUpdate {
                ban_id,
                fields,
                jobs,
            });
        }
    }

    if complete_refresh {
        changes.stale = stored
            .iter()
            .filter(|ban| !seen.contains(&ban.identity(supports_ban_ids)))
            .cloned()
            .collect();
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn ban(source_ban_id: Option<i64>, ckey: &str) -> Ban {
        Ban {
            id: None,
            source_id: 1,
            source_name: "example".to_string(),
            source_ban_id,
            ckey: ckey.to_string(),
            ban_type: BanType::Server,
            banned_on: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            banned_by: "mod1".to_string(),
            expires: None,
            reason: "x".to_string(),
            unbanned_by: None,
            jobs: BTreeSet::new(),
        }
    }

    fn stored(id: i64, source_ban_id: Option<i64>, ckey: &str) -> Ban {
        Ban {
            id: Some(id),
            ..ban(source_ban_id, ckey)
        }
    }

    fn jobs(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cold_start_inserts_everything() {
        let fetched = vec![ban(Some(7), "alice")];
        let changes = compute(&[], fetched, true, true);
        assert_eq!(changes.inserts.len(), 1);
        assert_eq!(changes.update_count(), 0);
        assert!(changes.stale.is_empty());
    }

    #[test]
    fn test_identical_input_is_a_fixed_point() {
        let stored_bans = vec![stored(1, Some(7), "alice"), stored(2, Some(8), "bob")];
        let fetched = vec![ban(Some(7), "alice"), ban(Some(8), "bob")];
        let changes = compute(&stored_bans, fetched, true, true);
        assert!(!changes.has_changes());
    }

    #[test]
    fn test_stable_input_yields_no_changes_incrementally() {
        // An incremental refresh right after a full one sees the same
        // upstream state and must not touch the store.
        let stored_bans = vec![stored(1, Some(7), "alice"), stored(2, Some(8), "bob")];
        let fetched = vec![ban(Some(7), "alice"), ban(Some(8), "bob")];
        let changes = compute(&stored_bans, fetched, true, false);
        assert!(changes.inserts.is_empty());
        assert!(changes.updates.is_empty());
        assert!(!changes.has_changes());
    }

    #[test]
    fn test_reason_change_produces_one_update() {
        let stored_bans = vec![stored(1, Some(7), "alice")];
        let mut fetched = ban(Some(7), "alice");
        fetched.reason = "y".to_string();

        let changes = compute(&stored_bans, vec![fetched], true, false);
        assert!(changes.inserts.is_empty());
        assert_eq!(changes.update_count(), 1);
        let update = &changes.updates[0];
        assert_eq!(update.ban_id, 1);
        assert_eq!(update.fields.as_ref().unwrap().reason, "y");
        assert!(update.jobs.is_none());
    }

    #[test]
    fn test_job_set_change_produces_one_update() {
        let mut old = stored(1, Some(7), "alice");
        old.ban_type = BanType::Job;
        old.jobs = jobs(&["Captain", "HoS"]);

        let mut new = ban(Some(7), "alice");
        new.ban_type = BanType::Job;
        new.jobs = jobs(&["Captain"]);

        let changes = compute(&[old], vec![new], true, false);
        assert_eq!(changes.update_count(), 1);
        let update = &changes.updates[0];
        assert!(update.fields.is_none());
        assert_eq!(update.jobs.as_ref().unwrap(), &jobs(&["Captain"]));
    }

    #[test]
    fn test_field_and_job_changes_count_separately() {
        let mut old = stored(1, Some(7), "alice");
        old.ban_type = BanType::Job;
        old.jobs = jobs(&["Captain"]);

        let mut new = ban(Some(7), "alice");
        new.ban_type = BanType::Job;
        new.jobs = jobs(&["Captain", "HoS"]);
        new.reason = "updated".to_string();

        let changes = compute(&[old], vec![new], true, false);
        assert_eq!(changes.updates.len(), 1);
        assert_eq!(changes.update_count(), 2);
    }

    #[test]
    fn test_unban_detected() {
        let stored_bans = vec![stored(1, Some(7), "alice")];
        let mut fetched = ban(Some(7), "alice");
        fetched.unbanned_by = Some("mod1".to_string());

        let changes = compute(&stored_bans, vec![fetched], true, false);
        assert_eq!(changes.update_count(), 1);
        assert_eq!(
            changes.updates[0]
                .fields
                .as_ref()
                .unwrap()
                .unbanned_by
                .as_deref(),
            Some("mod1")
        );
    }

    #[test]
    fn test_content_identity_deletion_on_complete_refresh() {
        // No stable ids: identity falls back to the content tuple.
        let stored_bans = vec![
            stored(1, None, "alice"),
            stored(2, None, "bob"),
            stored(3, None, "carol"),
        ];
        let fetched = vec![ban(None, "alice"), ban(None, "bob")];

        let changes = compute(&stored_bans, fetched, false, true);
        assert!(changes.inserts.is_empty());
        assert_eq!(changes.update_count(), 0);
        assert_eq!(changes.stale.len(), 1);
        assert_eq!(changes.stale[0].ckey, "carol");
    }

    #[test]
    fn test_incremental_never_produces_stale() {
        let stored_bans = vec![stored(1, Some(7), "alice"), stored(2, Some(8), "bob")];
        let changes = compute(&stored_bans, vec![ban(Some(7), "alice")], true, false);
        assert!(changes.stale.is_empty());
    }

    #[test]
    fn test_duplicate_identity_last_wins() {
        let stored_bans = vec![stored(1, Some(7), "alice")];
        let mut first = ban(Some(7), "alice");
        first.reason = "first".to_string();
        let mut second = ban(Some(7), "alice");
        second.reason = "second".to_string();

        let changes = compute(&stored_bans, vec![first, second], true, false);
        assert_eq!(changes.duplicates, 1);
        assert_eq!(changes.fetched_count, 1);
        assert_eq!(changes.updates[0].fields.as_ref().unwrap().reason, "second");
    }

    #[test]
    fn test_rerun_of_applied_changes_is_empty() {
        // Simulate applying the diff, then diffing again.
        let stored_bans = vec![stored(1, Some(7), "alice")];
        let mut fetched = ban(Some(7), "alice");
        fetched.reason = "y".to_string();

        let first = compute(&stored_bans, vec![fetched.clone()], true, true);
        assert_eq!(first.update_count(), 1);

        let mut applied = stored_bans[0].clone();
        let patch = first.updates[0].fields.as_ref().unwrap();
        applied.reason = patch.reason.clone();
        applied.expires = patch.expires;
        applied.unbanned_by = patch.unbanned_by.clone();

        let second = compute(&[applied], vec![fetched], true, true);
        assert!(!second.has_changes());
    }
}
