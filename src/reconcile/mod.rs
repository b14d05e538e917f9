// src/reconcile/mod.rs

//! Reconciliation of fetched bans against the store.

pub mod diff;
pub mod safety;

pub use diff::{compute, ChangeSet};
pub use safety::{DeletionGate, DeletionGateConfig, GateResult};

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result};
use crate::models::{Ban, ReconcileStats, RefreshKind};
use crate::sources::SourceAdapter;
use crate::store::BanStore;

/// Drives one adapter's fetch, diff, and commit cycle.
#[derive(Clone)]
pub struct Reconciler {
    store: BanStore,
    gate: DeletionGate,
}

impl Reconciler {
    pub fn new(store: BanStore) -> Self {
        Self {
            store,
            gate: DeletionGate::new(),
        }
    }

    /// Run one reconciliation pass for `adapter`.
    ///
    /// A `SourceUnavailable` fetch is absorbed here (warn, skip, no
    /// store mutation); every other failure propagates to the caller as
    /// the job's result.
    #[instrument(skip_all, fields(adapter = adapter.name(), refresh = refresh.as_str()))]
    pub async fn run(
        &self,
        adapter: &dyn SourceAdapter,
        refresh: RefreshKind,
    ) -> Result<ReconcileStats> {
        let start_time = Utc::now();

        let fetched = match self.fetch(adapter, refresh).await {
            Ok(bans) => bans,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "source unavailable, skipping until next trigger");
                return Ok(ReconcileStats {
                    adapter: adapter.name().to_string(),
                    refresh,
                    start_time,
                    end_time: Utc::now(),
                    fetched: 0,
                    stored: 0,
                    inserted: 0,
                    updated: 0,
                    deleted: 0,
                    duplicates: 0,
                    skipped: true,
                });
            }
            Err(e) => return Err(e),
        };

        let names = adapter.sources();
        let source_map = self.store.ensure_sources(&names).await?;

        let mut resolved = Vec::with_capacity(fetched.len());
        for mut ban in fetched {
            let source = source_map.get(&ban.source_name).ok_or_else(|| {
                AppError::malformed(
                    adapter.name(),
                    format!("ban references undeclared source '{}'", ban.source_name),
                )
            })?;
            ban.source_id = source.id;
            ban.canonicalize();
            resolved.push(ban);
        }

        let source_ids: Vec<i64> = source_map.values().map(|source| source.id).collect();
        let stored = self.store.bans_for_sources(&source_ids).await?;

        let effective = effective_refresh(stored.is_empty(), refresh);

        let changes = diff::compute(
            &stored,
            resolved,
            adapter.supports_ban_ids(),
            effective.is_complete(),
        );
        if changes.duplicates > 0 {
            warn!(
                duplicates = changes.duplicates,
                "upstream listed duplicate ban identities; kept the last occurrence"
            );
        }

        let inserted = changes.inserts.len();
        let updated = changes.update_count();
        self.store.commit(&changes.inserts, &changes.updates).await?;

        let mut deleted = 0;
        if effective.is_complete() {
            self.gate.validate(
                adapter.name(),
                changes.fetched_count,
                stored.len(),
                changes.stale.len(),
            )?;
            let stale_ids: Vec<i64> = changes.stale.iter().filter_map(|ban| ban.id).collect();
            deleted = self.store.delete_bans(&stale_ids).await?;
        }

        let stats = ReconcileStats {
            adapter: adapter.name().to_string(),
            refresh: effective,
            start_time,
            end_time: Utc::now(),
            fetched: changes.fetched_count,
            stored: stored.len(),
            inserted,
            updated,
            deleted,
            duplicates: changes.duplicates,
            skipped: false,
        };

        if stats.changed() {
            info!(
                fetched = stats.fetched,
                stored = stats.stored,
                inserted = stats.inserted,
                updated = stats.updated,
                deleted = stats.deleted,
                "reconciliation committed"
            );
        } else {
            info!(fetched = stats.fetched, "reconciliation: no drift");
        }

        Ok(stats)
    }

    async fn fetch(&self, adapter: &dyn SourceAdapter, refresh: RefreshKind) -> Result<Vec<Ban>> {
        match refresh {
            RefreshKind::Complete => adapter.fetch_all().await,
            RefreshKind::Incremental => adapter.fetch_new().await,
        }
    }
}

/// A cold store always gets the complete treatment, whatever the
/// trigger asked for.
fn effective_refresh(stored_is_empty: bool, requested: RefreshKind) -> RefreshKind {
    if stored_is_empty {
        RefreshKind::Complete
    } else {
        requested
    }
}
