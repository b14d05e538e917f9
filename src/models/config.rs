// src/models/config.rs

use std::collections::HashMap;

use serde::Deserialize;

/// Root configuration structure.
///
/// Keys follow the operator-facing camelCase document layout, so the
/// serde names here are the flag paths accepted on the command line
/// (`--dbConfig.dbType=MySql`).
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub db_config: DbConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
}

/// Store dialect and connection settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    pub db_type: DbDialect,
    pub connection_string: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Supported store dialects.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DbDialect {
    Postgres,
    MySql,
    #[serde(rename = "MariaDB")]
    MariaDb,
}

impl DbDialect {
    /// Postgres numbers its bind parameters; MySQL and MariaDB use `?`.
    pub fn is_postgres(&self) -> bool {
        matches!(self, DbDialect::Postgres)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbDialect::Postgres => "Postgres",
            DbDialect::MySql => "MySql",
            DbDialect::MariaDb => "MariaDB",
        }
    }
}

/// HTTP client settings shared by every adapter.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// How far back `fetch_new` must reach. Overshooting is safe;
    /// reconciliation is idempotent on identical input.
    #[serde(default = "default_freshness_window_mins")]
    pub freshness_window_mins: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            freshness_window_mins: default_freshness_window_mins(),
        }
    }
}

/// Per-source adapter settings, keyed by source name.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Which parser an upstream speaks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Paginated JSON: `GET {base}/bans/{perPage}/{page}`
    Standard,
    /// Single-page HTML ban table
    Html,
}

fn default_max_connections() -> u32 {
    10
}

fn default_user_agent() -> String {
    concat!("bansync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_freshness_window_mins() -> i64 {
    90
}

fn default_per_page() -> u32 {
    100
}

fn default_enabled() -> bool {
    true
}
