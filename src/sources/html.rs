// src/sources/html.rs

//! Adapter for upstreams that only publish an HTML ban table.
//!
//! One `<tr class="ban">` per ban, with cells classed `ckey`, `type`,
//! `date`, `admin`, `expires`, `reason` and optionally `unbanned`.
//! These panels expose no stable ban identifiers, so identity falls
//! back to the content tuple and the whole table is fetched every time.

use std::collections::BTreeSet;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Ban, BanType, SourceConfig};
use crate::utils::normalize_base_url;

use super::{parse_utc_instant, SourceAdapter};

/// Adapter for single-page HTML ban tables.
pub struct HtmlAdapter {
    name: String,
    url: String,
    client: Client,
}

impl HtmlAdapter {
    pub fn new(name: String, source: &SourceConfig, client: Client) -> Result<Self> {
        Ok(Self {
            name,
            url: normalize_base_url(&source.url)?,
            client,
        })
    }

    async fn fetch_document(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::unavailable(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::unavailable(
                &self.name,
                format!("HTTP {status} from {}", self.url),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::unavailable(&self.name, e))
    }

    /// Parse the ban table out of a fetched page.
    fn parse_table(&self, html: &str) -> Result<Vec<Ban>> {
        let document = Html::parse_document(html);
        let row_sel = Self::parse_selector("tr.ban")?;

        let mut bans = Vec::new();
        let mut saw_row = false;
        for row in document.select(&row_sel) {
            saw_row = true;
            bans.push(self.parse_row(&row)?);
        }

        // A panel with zero bans still renders its table shell; a page
        // with no recognizable rows at all is upstream drift.
        if !saw_row && !html.contains("class=\"bans\"") {
            return Err(AppError::malformed(
                &self.name,
                "page contains no ban table",
            ));
        }

        Ok(bans)
    }

    fn parse_row(&self, row: &ElementRef<'_>) -> Result<Ban> {
        let ckey = self.cell_text(row, "td.ckey")?;
        let kind = self.cell_text(row, "td.type")?;
        let date = self.cell_text(row, "td.date")?;
        let admin = self.cell_text(row, "td.admin")?;
        let expires = self.optional_cell_text(row, "td.expires")?;
        let reason = self.optional_cell_text(row, "td.reason")?.unwrap_or_default();
        let unbanned = self.optional_cell_text(row, "td.unbanned")?;

        let banned_on = parse_utc_instant(&date).ok_or_else(|| {
            AppError::malformed(&self.name, format!("unparseable ban date '{date}'"))
        })?;
        let expires = match expires.as_deref() {
            None | Some("") | Some("-") | Some("permanent") => None,
            Some(text) => Some(parse_utc_instant(text).ok_or_else(|| {
                AppError::malformed(&self.name, format!("unparseable expiry '{text}'"))
            })?),
        };

        let (ban_type, jobs): (BanType, BTreeSet<String>) = if kind.eq_ignore_ascii_case("server")
        {
            (BanType::Server, BTreeSet::new())
        } else {
            let jobs: BTreeSet<String> = kind
                .split(',')
                .map(|job| job.trim().to_string())
                .filter(|job| !job.is_empty())
                .collect();
            if jobs.is_empty() {
                return Err(AppError::malformed(
                    &self.name,
                    format!("ban row for '{ckey}' has an empty job list"),
                ));
            }
            (BanType::Job, jobs)
        };

        Ok(Ban {
            id: None,
            source_id: 0,
            source_name: self.name.clone(),
            source_ban_id: None,
            ckey,
            ban_type,
            banned_on,
            banned_by: admin,
            expires,
            reason,
            unbanned_by: unbanned.filter(|u| !u.is_empty()),
            jobs,
        })
    }

    fn cell_text(&self, row: &ElementRef<'_>, selector: &str) -> Result<String> {
        self.optional_cell_text(row, selector)?.ok_or_else(|| {
            AppError::malformed(&self.name, format!("ban row is missing cell '{selector}'"))
        })
    }

    fn optional_cell_text(&self, row: &ElementRef<'_>, selector: &str) -> Result<Option<String>> {
        let sel = Self::parse_selector(selector)?;
        Ok(row
            .select(&sel)
            .next()
            .map(|cell| cell.text().collect::<String>().trim().to_string()))
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s)
            .map_err(|e| AppError::validation(format!("invalid selector '{s}': {e:?}")))
    }
}

#[async_trait::async_trait]
impl SourceAdapter for HtmlAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn supports_ban_ids(&self) -> bool {
        false
    }

    async fn fetch_all(&self) -> Result<Vec<Ban>> {
        let html = self.fetch_document().await?;
        self.parse_table(&html)
    }

    /// The table is one cheap page; a fresh fetch is a full fetch.
    async fn fetch_new(&self) -> Result<Vec<Ban>> {
        self.fetch_all().await
    }
}
