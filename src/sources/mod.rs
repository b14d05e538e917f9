//! Source adapter layer.
//!
//! Each upstream community exposes its ban list in its own format; an
//! adapter turns that format into canonical `Ban` values. Everything
//! past the adapter boundary is format-agnostic.

mod html;
mod standard;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use tracing::debug;

use crate::error::Result;
use crate::models::{AppConfig, Ban, SourceKind};

pub use html::HtmlAdapter;
pub use standard::StandardAdapter;

/// A parser for one upstream ban endpoint.
///
/// Adapters must set `Ban.source_name` to a name from their own
/// `sources()` list and emit all instants in UTC. Transport failures
/// surface as `SourceUnavailable`, shape violations as
/// `MalformedPayload`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Display name for logs and scheduling.
    fn name(&self) -> &str;

    /// Every `BanSource` name this adapter owns.
    fn sources(&self) -> Vec<String>;

    /// Whether the upstream exposes stable ban identifiers.
    fn supports_ban_ids(&self) -> bool;

    /// Every ban the upstream exposes, current and historical.
    async fn fetch_all(&self) -> Result<Vec<Ban>>;

    /// A superset of recently-changed bans. Overshooting is safe;
    /// reconciliation is idempotent on identical input.
    async fn fetch_new(&self) -> Result<Vec<Ban>>;
}

/// Construct one adapter per enabled `[sources.<name>]` block.
///
/// Compile-time registry: adding an upstream means adding a `SourceKind`
/// arm and a config block, nothing else.
pub fn build_adapters(
    config: &AppConfig,
    client: &Client,
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut names: Vec<&String> = config.sources.keys().collect();
    names.sort();

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for name in names {
        let source = &config.sources[name];
        if !source.enabled {
            debug!(source = %name, "adapter disabled by configuration");
            continue;
        }
        let adapter: Arc<dyn SourceAdapter> = match source.kind {
            SourceKind::Standard => Arc::new(StandardAdapter::new(
                name.clone(),
                source,
                &config.scheduler,
                client.clone(),
            )?),
            SourceKind::Html => Arc::new(HtmlAdapter::new(name.clone(), source, client.clone())?),
        };
        adapters.push(adapter);
    }
    Ok(adapters)
}

/// Parse an upstream timestamp, coercing unqualified values to UTC.
///
/// Accepts RFC 3339 as well as the bare `YYYY-MM-DD HH:MM:SS` (or
/// `T`-separated) forms common in game-server panels.
pub(crate) fn parse_utc_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let parsed = parse_utc_instant("2024-01-15T14:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_bare_forms_as_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        assert_eq!(parse_utc_instant("2024-01-15T14:30:00"), Some(expected));
        assert_eq!(parse_utc_instant("2024-01-15 14:30:00"), Some(expected));
        assert_eq!(parse_utc_instant(" 2024-01-15 14:30:00 "), Some(expected));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_utc_instant("yesterday"), None);
        assert_eq!(parse_utc_instant(""), None);
    }
}
