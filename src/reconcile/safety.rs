//! Deletion gate for complete refreshes.
//!
//! Prevents a broken upstream from wiping the store: when a source
//! returns zero bans while more than one is stored, the deletion phase
//! is aborted instead of removing everything.

use crate::error::{AppError, Result};

/// Deletion gate configuration.
#[derive(Debug, Clone)]
pub struct DeletionGateConfig {
    /// Largest store size an empty fetch is still allowed to clear.
    /// Single-ban fleets are not protected; only mass wipes are.
    pub max_unguarded: usize,
}

impl Default for DeletionGateConfig {
    fn default() -> Self {
        Self { max_unguarded: 1 }
    }
}

/// Gate deciding whether a complete refresh may delete stale rows.
#[derive(Debug, Clone, Default)]
pub struct DeletionGate {
    config: DeletionGateConfig,
}

/// Result of the gate check.
#[derive(Debug, Clone)]
pub enum GateResult {
    /// Safe to delete the stale rows
    Safe { stale_count: usize },
    /// Empty fetch against a populated store - abort deletions
    Triggered { stored_count: usize },
}

impl DeletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DeletionGateConfig) -> Self {
        Self { config }
    }

    /// Check whether deleting `stale_count` rows is safe given what the
    /// upstream just returned.
    pub fn check(&self, fetched_count: usize, stored_count: usize, stale_count: usize) -> GateResult {
        if fetched_count == 0 && stale_count > self.config.max_unguarded {
            return GateResult::Triggered { stored_count };
        }
        GateResult::Safe { stale_count }
    }

    /// Validate and return Ok if safe, `SafetyAbort` if triggered.
    pub fn validate(
        &self,
        source: &str,
        fetched_count: usize,
        stored_count: usize,
        stale_count: usize,
    ) -> Result<()> {
        match self.check(fetched_count, stored_count, stale_count) {
            GateResult::Safe { stale_count } => {
                if stale_count > 0 {
                    tracing::info!(source, stale_count, "deletion gate: safe");
                }
                Ok(())
            }
            GateResult::Triggered { stored_count } => {
                tracing::error!(
                    source,
                    stored_count,
                    "deletion gate: TRIGGERED - source returned no bans, refusing to wipe store"
                );
                Err(AppError::SafetyAbort {
                    source_name: source.to_string(),
                    stored_count,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_when_fetch_is_nonempty() {
        let gate = DeletionGate::new();
        assert!(matches!(gate.check(2, 3, 1), GateResult::Safe { .. }));
    }

    #[test]
    fn test_triggered_on_empty_fetch_with_populated_store() {
        let gate = DeletionGate::new();
        assert!(matches!(
            gate.check(0, 5, 5),
            GateResult::Triggered { stored_count: 5 }
        ));
    }

    #[test]
    fn test_single_ban_store_is_not_protected() {
        let gate = DeletionGate::new();
        assert!(matches!(gate.check(0, 1, 1), GateResult::Safe { stale_count: 1 }));
    }

    #[test]
    fn test_nothing_stale_is_safe() {
        let gate = DeletionGate::new();
        assert!(matches!(gate.check(0, 0, 0), GateResult::Safe { .. }));
    }

    #[test]
    fn test_validate_returns_error_when_triggered() {
        let gate = DeletionGate::new();
        let err = gate.validate("example", 0, 5, 5).unwrap_err();
        assert!(matches!(err, AppError::SafetyAbort { stored_count: 5, .. }));
    }

    #[test]
    fn test_custom_threshold() {
        let gate = DeletionGate::with_config(DeletionGateConfig { max_unguarded: 10 });
        assert!(matches!(gate.check(0, 8, 8), GateResult::Safe { .. }));
        assert!(matches!(gate.check(0, 11, 11), GateResult::Triggered { .. }));
    }
}
