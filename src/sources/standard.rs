// src/sources/standard.rs

//! Adapter for the standard paginated JSON ban endpoint.
//!
//! `GET {base}/bans/{perPage}/{page}` returns
//! `{ "value": { "bans": [...], "lastPage": n } }` with bans ordered
//! newest first. These upstreams expose stable ban ids, so identity is
//! `(source, id)`.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Ban, BanType, SchedulerConfig, SourceConfig};
use crate::utils::normalize_base_url;

use super::{parse_utc_instant, SourceAdapter};

/// Concurrent page requests per adapter, bounded to respect upstream
/// capacity.
const MAX_PAGE_FANOUT: usize = 6;

/// Adapter for upstreams speaking the standard paginated JSON shape.
pub struct StandardAdapter {
    name: String,
    base_url: String,
    per_page: u32,
    freshness_window: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    value: PageBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    bans: Vec<RawBan>,
    last_page: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBan {
    id: i64,
    ban_apply_time: String,
    ban_expire_time: Option<String>,
    admin_ckey: String,
    banned_ckey: String,
    #[serde(default)]
    role: Vec<String>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    unbanned_by: Option<String>,
}

impl StandardAdapter {
    pub fn new(
        name: String,
        source: &SourceConfig,
        scheduler: &SchedulerConfig,
        client: Client,
    ) -> Result<Self> {
        Ok(Self {
            name,
            base_url: normalize_base_url(&source.url)?,
            per_page: source.per_page,
            freshness_window: Duration::minutes(scheduler.freshness_window_mins),
            client,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<PageBody> {
        let url = format!("{}/bans/{}/{}", self.base_url, self.per_page, page);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::unavailable(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::unavailable(
                &self.name,
                format!("HTTP {status} from {url}"),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::unavailable(&self.name, e))?;
        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|e| AppError::malformed(&self.name, e))?;
        Ok(envelope.value)
    }

    fn convert(&self, raw: RawBan) -> Result<Ban> {
        let banned_on = parse_utc_instant(&raw.ban_apply_time).ok_or_else(|| {
            AppError::malformed(
                &self.name,
                format!("ban {} has unparseable banApplyTime '{}'", raw.id, raw.ban_apply_time),
            )
        })?;
        let expires = match &raw.ban_expire_time {
            Some(text) => Some(parse_utc_instant(text).ok_or_else(|| {
                AppError::malformed(
                    &self.name,
                    format!("ban {} has unparseable banExpireTime '{text}'", raw.id),
                )
            })?),
            None => None,
        };

        let first_role = raw.role.first().ok_or_else(|| {
            AppError::malformed(&self.name, format!("ban {} has an empty role list", raw.id))
        })?;
        let (ban_type, jobs): (BanType, BTreeSet<String>) = if first_role == "Server" {
            (BanType::Server, BTreeSet::new())
        } else {
            (BanType::Job, raw.role.into_iter().collect())
        };

        Ok(Ban {
            id: None,
            source_id: 0,
            source_name: self.name.clone(),
            source_ban_id: Some(raw.id),
            ckey: raw.banned_ckey,
            ban_type,
            banned_on,
            banned_by: raw.admin_ckey,
            expires,
            reason: raw.reason,
            unbanned_by: raw.unbanned_by,
            jobs,
        })
    }

    fn convert_page(&self, body: PageBody) -> Result<Vec<Ban>> {
        body.bans.into_iter().map(|raw| self.convert(raw)).collect()
    }

    fn oldest(bans: &[Ban]) -> Option<DateTime<Utc>> {
        bans.iter().map(|b| b.banned_on).min()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for StandardAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn supports_ban_ids(&self) -> bool {
        true
    }

    async fn fetch_all(&self) -> Result<Vec<Ban>> {
        let first = self.fetch_page(1).await?;
        let last_page = first.last_page;
        let mut bans = self.convert_page(first)?;

        if last_page > 1 {
            let pages: Vec<u32> = (2..=last_page).collect();
            let results: Vec<Result<PageBody>> = stream::iter(pages)
                .map(|page| self.fetch_page(page))
                .buffer_unordered(MAX_PAGE_FANOUT)
                .collect()
                .await;
            for result in results {
                bans.extend(self.convert_page(result?)?);
            }
        }

        Ok(bans)
    }

    async fn fetch_new(&self) -> Result<Vec<Ban>> {
        let cutoff = Utc::now() - self.freshness_window;
        let mut bans = Vec::new();
        let mut page = 1;

        // Pages come newest-first; stop after the first page that
        // reaches past the freshness window.
        loop {
            let body = self.fetch_page(page).await?;
            let last_page = body.last_page;
            let converted = self.convert_page(body)?;
            let reached_cutoff = Self::oldest(&converted).is_some_and(|oldest| oldest < cutoff);
            bans.extend(converted);

            if reached_cutoff || page >= last_page {
                break;
            }
            page += 1;
        }

        Ok(bans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn adapter() -> StandardAdapter {
        let source = SourceConfig {
            kind: SourceKind::Standard,
            url: "https://bans.example.org/".to_string(),
            per_page: 100,
            enabled: true,
        };
        StandardAdapter::new(
            "example".to_string(),
            &source,
            &SchedulerConfig::default(),
            Client::new(),
        )
        .unwrap()
    }

    fn page(json: &str) -> PageBody {
        serde_json::from_str::<Envelope>(json).unwrap().value
    }

    const SERVER_BAN: &str = r#"{
        "value": {
            "bans": [{
                "id": 7,
                "banApplyTime": "2024-01-15 12:00:00",
                "banExpireTime": null,
                "adminCkey": "Mod_1",
                "bannedCkey": "Alice",
                "role": ["Server"],
                "reason": "rule 1"
            }],
            "lastPage": 1
        }
    }"#;

    #[test]
    fn test_base_url_is_normalized() {
        assert_eq!(adapter().base_url, "https://bans.example.org");
    }

    #[test]
    fn test_convert_server_ban() {
        let body = page(SERVER_BAN);
        let bans = adapter().convert_page(body).unwrap();
        assert_eq!(bans.len(), 1);
        let ban = &bans[0];
        assert_eq!(ban.source_ban_id, Some(7));
        assert_eq!(ban.ban_type, BanType::Server);
        assert!(ban.jobs.is_empty());
        assert_eq!(ban.expires, None);
        // Keys come through raw; the reconciler canonicalizes.
        assert_eq!(ban.ckey, "Alice");
    }

    #[test]
    fn test_convert_job_ban_collects_roles() {
        let body = page(
            r#"{
            "value": {
                "bans": [{
                    "id": 8,
                    "banApplyTime": "2024-01-15T12:00:00",
                    "banExpireTime": "2024-02-15T12:00:00",
                    "adminCkey": "mod1",
                    "bannedCkey": "bob",
                    "role": ["Captain", "Head of Security", "Captain"],
                    "reason": "metagaming"
                }],
                "lastPage": 3
            }
        }"#,
        );
        assert_eq!(body.last_page, 3);
        let bans = adapter().convert_page(body).unwrap();
        let ban = &bans[0];
        assert_eq!(ban.ban_type, BanType::Job);
        // Duplicate roles collapse into the set.
        assert_eq!(ban.jobs.len(), 2);
        assert!(ban.jobs.contains("Captain"));
        assert!(ban.expires.is_some());
    }

    #[test]
    fn test_empty_role_list_is_malformed() {
        let body = page(
            r#"{
            "value": {
                "bans": [{
                    "id": 9,
                    "banApplyTime": "2024-01-15 12:00:00",
                    "banExpireTime": null,
                    "adminCkey": "mod1",
                    "bannedCkey": "eve",
                    "role": [],
                    "reason": ""
                }],
                "lastPage": 1
            }
        }"#,
        );
        let err = adapter().convert_page(body).unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload { .. }));
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let body = page(
            r#"{
            "value": {
                "bans": [{
                    "id": 10,
                    "banApplyTime": "soon",
                    "banExpireTime": null,
                    "adminCkey": "mod1",
                    "bannedCkey": "eve",
                    "role": ["Server"],
                    "reason": ""
                }],
                "lastPage": 1
            }
        }"#,
        );
        assert!(adapter().convert_page(body).is_err());
    }

    #[test]
    fn test_envelope_shape_violation() {
        let err = serde_json::from_str::<Envelope>(r#"{ "bans": [] }"#);
        assert!(err.is_err());
    }
}
