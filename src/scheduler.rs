// src/scheduler.rs

//! Cron-style scheduler driving the reconciliation pipelines.
//!
//! Each adapter gets two triggers: incremental refreshes at minutes
//! 5-25 and 35-55 (every five), and complete refreshes on the hour and
//! half hour. Different adapters run concurrently; the same adapter
//! never overlaps itself - a firing that would overlap is dropped, not
//! queued, so a late job cannot cause a burst of reconciliations
//! against stale data.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use reqwest::Client;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{AppConfig, RefreshKind};
use crate::reconcile::Reconciler;
use crate::sources::{build_adapters, SourceAdapter};

/// Complete-refresh trigger minutes.
const COMPLETE_MINUTES: &[u32] = &[0, 30];
/// Incremental-refresh trigger minutes.
const INCREMENTAL_MINUTES: &[u32] = &[5, 10, 15, 20, 25, 35, 40, 45, 50, 55];

/// What a trigger hands its job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub adapter: String,
    pub refresh: RefreshKind,
    pub trigger: &'static str,
}

/// Owns the trigger tasks for every registered adapter.
pub struct Scheduler {
    reconciler: Reconciler,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(reconciler: Reconciler, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            reconciler,
            shutdown,
        }
    }

    /// Bootstrap pass: discover adapters from configuration, register
    /// their triggers, and block until shutdown.
    pub async fn run(&self, config: &AppConfig, client: &Client) -> Result<()> {
        let adapters = build_adapters(config, client)?;
        info!(
            adapters = adapters.len(),
            "bootstrap: registering scheduler triggers"
        );

        let mut handles = Vec::new();
        for adapter in adapters {
            info!(
                adapter = adapter.name(),
                supports_ban_ids = adapter.supports_ban_ids(),
                "registered adapter"
            );
            // Both triggers share the guard, so incremental and
            // complete firings of one adapter exclude each other too.
            let guard = Arc::new(Mutex::new(()));
            for (minutes, refresh, trigger) in [
                (COMPLETE_MINUTES, RefreshKind::Complete, "complete"),
                (INCREMENTAL_MINUTES, RefreshKind::Incremental, "incremental"),
            ] {
                handles.push(tokio::spawn(trigger_loop(
                    self.reconciler.clone(),
                    Arc::clone(&adapter),
                    Arc::clone(&guard),
                    minutes,
                    refresh,
                    trigger,
                    self.shutdown.clone(),
                )));
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
        Ok(())
    }
}

async fn trigger_loop(
    reconciler: Reconciler,
    adapter: Arc<dyn SourceAdapter>,
    guard: Arc<Mutex<()>>,
    minutes: &'static [u32],
    refresh: RefreshKind,
    trigger: &'static str,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let fire_at = next_fire(now, minutes);
        let wait = (fire_at - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => return,
        }

        // At-most-one running job per adapter: drop, never queue.
        let Ok(_running) = guard.try_lock() else {
            warn!(
                adapter = adapter.name(),
                trigger, "previous job still running, dropping this firing"
            );
            continue;
        };

        let context = JobContext {
            adapter: adapter.name().to_string(),
            refresh,
            trigger,
        };

        tokio::select! {
            result = reconciler.run(adapter.as_ref(), context.refresh) => {
                // Job failures stay inside this trigger; the next firing
                // retries naturally.
                if let Err(e) = result {
                    error!(
                        adapter = %context.adapter,
                        trigger,
                        error = %e,
                        "job failed"
                    );
                }
            }
            _ = shutdown.changed() => {
                info!(adapter = %context.adapter, trigger, "job cancelled by shutdown");
                return;
            }
        }
    }
}

/// The next instant strictly after `after` whose minute is in `minutes`.
pub fn next_fire(after: DateTime<Utc>, minutes: &[u32]) -> DateTime<Utc> {
    let mut candidate = after
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(after)
        + Duration::minutes(1);
    // At most one wrap of the hour.
    loop {
        if minutes.contains(&candidate.minute()) {
            return candidate;
        }
        candidate += Duration::minutes(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_next_complete_fire() {
        assert_eq!(next_fire(at(11, 58, 0), COMPLETE_MINUTES), at(12, 0, 0));
        assert_eq!(next_fire(at(12, 0, 0), COMPLETE_MINUTES), at(12, 30, 0));
        assert_eq!(next_fire(at(12, 29, 59), COMPLETE_MINUTES), at(12, 30, 0));
    }

    #[test]
    fn test_next_incremental_fire() {
        assert_eq!(next_fire(at(12, 3, 0), INCREMENTAL_MINUTES), at(12, 5, 0));
        assert_eq!(next_fire(at(12, 5, 0), INCREMENTAL_MINUTES), at(12, 10, 0));
        // Skips the half-hour slots, which belong to complete refreshes.
        assert_eq!(next_fire(at(12, 26, 0), INCREMENTAL_MINUTES), at(12, 35, 0));
        assert_eq!(next_fire(at(12, 56, 0), INCREMENTAL_MINUTES), at(13, 5, 0));
    }

    #[test]
    fn test_fire_is_strictly_in_the_future() {
        // A trigger waking exactly on its minute must not re-fire it.
        let fired = next_fire(at(12, 5, 30), INCREMENTAL_MINUTES);
        assert_eq!(fired, at(12, 10, 0));
        assert!(fired > at(12, 5, 30));
    }

    #[test]
    fn test_patterns_are_disjoint() {
        for minute in INCREMENTAL_MINUTES {
            assert!(!COMPLETE_MINUTES.contains(minute));
        }
    }
}
