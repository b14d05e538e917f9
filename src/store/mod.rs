// src/store/mod.rs

//! Typed read/write access to the persistent ban store.
//!
//! The store speaks Postgres, MySQL, or MariaDB through sqlx's `Any`
//! driver; the dialect only matters for bind-parameter syntax and for
//! retrieving generated ids. All statements here are written with `?`
//! placeholders and rendered per dialect.

pub mod models;

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};
use tracing::instrument;

use crate::error::Result;
use crate::models::{canonical_key, Ban, BanSource, BanUpdate, DbConfig, DbDialect};
use models::{epoch_from_instant, BanRow, JobBanRow, SourceRow};

const SELECT_BAN: &str = "SELECT b.id, b.source_id, s.name AS source_name, b.source_ban_id, \
     b.ckey, b.ban_type, b.banned_on, b.banned_by, b.expires, b.reason, b.unbanned_by \
     FROM bans b JOIN ban_sources s ON s.id = b.source_id";

const INSERT_BAN: &str = "INSERT INTO bans \
     (source_id, source_ban_id, ckey, ban_type, banned_on, banned_by, expires, reason, unbanned_by) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Gateway over the `bans` / `job_bans` / `ban_sources` tables.
#[derive(Clone)]
pub struct BanStore {
    pool: AnyPool,
    dialect: DbDialect,
}

impl BanStore {
    /// Connect a bounded pool for the configured dialect.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.connection_string)
            .await?;
        Ok(Self {
            pool,
            dialect: config.db_type,
        })
    }

    pub fn dialect(&self) -> DbDialect {
        self.dialect
    }

    /// Render `?` placeholders into the dialect's bind syntax.
    fn render(&self, sql: &str) -> String {
        render_placeholders(sql, self.dialect)
    }

    /// Ensure every declared source exists, returning store-resident
    /// rows keyed by name. Missing rows are created in one transaction.
    #[instrument(skip(self))]
    pub async fn ensure_sources(&self, names: &[String]) -> Result<HashMap<String, BanSource>> {
        let mut map = HashMap::new();
        let mut tx = self.pool.begin().await?;

        for name in names {
            let existing = sqlx::query_as::<_, SourceRow>(
                &self.render("SELECT id, name FROM ban_sources WHERE name = ?"),
            )
            .bind(name.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let source = match existing {
                Some(row) => row.into(),
                None => {
                    let id = self.insert_source(&mut tx, name).await?;
                    tracing::info!(source = %name, id, "registered new ban source");
                    BanSource::new(id, name.clone())
                }
            };
            map.insert(name.clone(), source);
        }

        tx.commit().await?;
        Ok(map)
    }

    /// Every stored ban belonging to the given sources, jobs hydrated.
    #[instrument(skip(self))]
    pub async fn bans_for_sources(&self, source_ids: &[i64]) -> Result<Vec<Ban>> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = self.render(&format!(
            "{SELECT_BAN} WHERE b.source_id IN ({})",
            in_list(source_ids.len())
        ));
        let mut query = sqlx::query_as::<_, BanRow>(&sql);
        for id in source_ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let jobs_sql = self.render(&format!(
            "SELECT jb.ban_id, jb.job FROM job_bans jb \
             JOIN bans b ON b.id = jb.ban_id WHERE b.source_id IN ({})",
            in_list(source_ids.len())
        ));
        let mut jobs_query = sqlx::query_as::<_, JobBanRow>(&jobs_sql);
        for id in source_ids {
            jobs_query = jobs_query.bind(*id);
        }
        let job_rows = jobs_query.fetch_all(&self.pool).await?;

        assemble(rows, job_rows)
    }

    /// Commit a batch of inserts and field/job updates in one
    /// transaction.
    #[instrument(skip_all, fields(inserts = inserts.len(), updates = updates.len()))]
    pub async fn commit(&self, inserts: &[Ban], updates: &[BanUpdate]) -> Result<()> {
        if inserts.is_empty() && updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for ban in inserts {
            self.insert_ban(&mut tx, ban).await?;
        }

        for update in updates {
            if let Some(fields) = &update.fields {
                sqlx::query(
                    &self.render(
                        "UPDATE bans SET reason = ?, expires = ?, unbanned_by = ? WHERE id = ?",
                    ),
                )
                .bind(fields.reason.as_str())
                .bind(fields.expires.map(epoch_from_instant))
                .bind(fields.unbanned_by.as_deref())
                .bind(update.ban_id)
                .execute(&mut *tx)
                .await?;
            }
            if let Some(jobs) = &update.jobs {
                sqlx::query(&self.render("DELETE FROM job_bans WHERE ban_id = ?"))
                    .bind(update.ban_id)
                    .execute(&mut *tx)
                    .await?;
                self.insert_jobs(&mut tx, update.ban_id, jobs).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete the given bans and their job rows in one transaction.
    #[instrument(skip(self))]
    pub async fn delete_bans(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let jobs_sql = self.render(&format!(
            "DELETE FROM job_bans WHERE ban_id IN ({})",
            in_list(ids.len())
        ));
        let mut jobs_query = sqlx::query(&jobs_sql);
        for id in ids {
            jobs_query = jobs_query.bind(*id);
        }
        jobs_query.execute(&mut *tx).await?;

        let bans_sql = self.render(&format!("DELETE FROM bans WHERE id IN ({})", in_list(ids.len())));
        let mut bans_query = sqlx::query(&bans_sql);
        for id in ids {
            bans_query = bans_query.bind(*id);
        }
        let deleted = bans_query.execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(deleted as usize)
    }

    /// All bans recorded against a player key. The input is
    /// canonicalized before matching.
    #[instrument(skip(self))]
    pub async fn bans_by_ckey(&self, raw_ckey: &str) -> Result<Vec<Ban>> {
        let ckey = canonical_key(raw_ckey);
        let rows = sqlx::query_as::<_, BanRow>(
            &self.render(&format!("{SELECT_BAN} WHERE b.ckey = ? ORDER BY b.banned_on")),
        )
        .bind(ckey.as_str())
        .fetch_all(&self.pool)
        .await?;

        let job_rows = self.jobs_for_bans(rows.iter().map(|r| r.id).collect()).await?;
        assemble(rows, job_rows)
    }

    /// Look up one ban by source name and upstream ban id.
    #[instrument(skip(self))]
    pub async fn ban_by_source(&self, source: &str, source_ban_id: i64) -> Result<Option<Ban>> {
        let row = sqlx::query_as::<_, BanRow>(
            &self.render(&format!("{SELECT_BAN} WHERE s.name = ? AND b.source_ban_id = ?")),
        )
        .bind(source)
        .bind(source_ban_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let job_rows = self.jobs_for_bans(vec![row.id]).await?;
        let mut bans = assemble(vec![row], job_rows)?;
        Ok(bans.pop())
    }

    /// Enumerate every known source.
    pub async fn sources(&self) -> Result<Vec<BanSource>> {
        let rows =
            sqlx::query_as::<_, SourceRow>("SELECT id, name FROM ban_sources ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_ban(&self, tx: &mut Transaction<'_, Any>, ban: &Ban) -> Result<i64> {
        let id = if self.dialect.is_postgres() {
            let sql = self.render(&format!("{INSERT_BAN} RETURNING id"));
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(ban.source_id)
                .bind(ban.source_ban_id)
                .bind(ban.ckey.as_str())
                .bind(ban.ban_type.as_str())
                .bind(epoch_from_instant(ban.banned_on))
                .bind(ban.banned_by.as_str())
                .bind(ban.expires.map(epoch_from_instant))
                .bind(ban.reason.as_str())
                .bind(ban.unbanned_by.as_deref())
                .fetch_one(&mut **tx)
                .await?
        } else {
            sqlx::query(INSERT_BAN)
                .bind(ban.source_id)
                .bind(ban.source_ban_id)
                .bind(ban.ckey.as_str())
                .bind(ban.ban_type.as_str())
                .bind(epoch_from_instant(ban.banned_on))
                .bind(ban.banned_by.as_str())
                .bind(ban.expires.map(epoch_from_instant))
                .bind(ban.reason.as_str())
                .bind(ban.unbanned_by.as_deref())
                .execute(&mut **tx)
                .await?;
            self.last_insert_id(tx).await?
        };
        self.insert_jobs(tx, id, &ban.jobs).await?;
        Ok(id)
    }

    async fn insert_source(&self, tx: &mut Transaction<'_, Any>, name: &str) -> Result<i64> {
        if self.dialect.is_postgres() {
            let sql = self.render("INSERT INTO ban_sources (name) VALUES (?) RETURNING id");
            Ok(sqlx::query_scalar::<_, i64>(&sql)
                .bind(name)
                .fetch_one(&mut **tx)
                .await?)
        } else {
            sqlx::query("INSERT INTO ban_sources (name) VALUES (?)")
                .bind(name)
                .execute(&mut **tx)
                .await?;
            self.last_insert_id(tx).await
        }
    }

    async fn last_insert_id(&self, tx: &mut Transaction<'_, Any>) -> Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT CAST(LAST_INSERT_ID() AS SIGNED)")
                .fetch_one(&mut **tx)
                .await?,
        )
    }

    async fn insert_jobs(
        &self,
        tx: &mut Transaction<'_, Any>,
        ban_id: i64,
        jobs: &BTreeSet<String>,
    ) -> Result<()> {
        for job in jobs {
            sqlx::query(&self.render("INSERT INTO job_bans (ban_id, job) VALUES (?, ?)"))
                .bind(ban_id)
                .bind(job.as_str())
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn jobs_for_bans(&self, ban_ids: Vec<i64>) -> Result<Vec<JobBanRow>> {
        if ban_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.render(&format!(
            "SELECT ban_id, job FROM job_bans WHERE ban_id IN ({})",
            in_list(ban_ids.len())
        ));
        let mut query = sqlx::query_as::<_, JobBanRow>(&sql);
        for id in &ban_ids {
            query = query.bind(*id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}

/// Group job rows by ban and rehydrate canonical records.
fn assemble(rows: Vec<BanRow>, job_rows: Vec<JobBanRow>) -> Result<Vec<Ban>> {
    let mut jobs_by_ban: HashMap<i64, BTreeSet<String>> = HashMap::new();
    for job in job_rows {
        jobs_by_ban.entry(job.ban_id).or_default().insert(job.job);
    }
    rows.into_iter()
        .map(|row| {
            let jobs = jobs_by_ban.remove(&row.id).unwrap_or_default();
            row.into_ban(jobs)
        })
        .collect()
}

/// `?, ?, ?` with `count` entries.
fn in_list(count: usize) -> String {
    let mut out = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// Rewrite `?` placeholders as `$1..$n` for Postgres; MySQL and MariaDB
/// take them as-is.
fn render_placeholders(sql: &str, dialect: DbDialect) -> String {
    if !dialect.is_postgres() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders_postgres() {
        assert_eq!(
            render_placeholders("SELECT * FROM t WHERE a = ? AND b = ?", DbDialect::Postgres),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn test_render_placeholders_mysql_untouched() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(render_placeholders(sql, DbDialect::MySql), sql);
        assert_eq!(render_placeholders(sql, DbDialect::MariaDb), sql);
    }

    #[test]
    fn test_in_list() {
        assert_eq!(in_list(1), "?");
        assert_eq!(in_list(3), "?, ?, ?");
    }

    #[test]
    fn test_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BanStore>();
    }
}
