// src/main.rs

//! bansync: unified ban aggregator for community game servers.
//!
//! `run` starts the scheduler daemon; the other subcommands are
//! operator tools that reuse the same pipeline pieces.

use std::path::Path;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bansync::config::{extract_overrides, load_config};
use bansync::error::{AppError, Result};
use bansync::models::{AppConfig, Ban, RefreshKind};
use bansync::reconcile::Reconciler;
use bansync::scheduler::Scheduler;
use bansync::sources::build_adapters;
use bansync::store::BanStore;
use bansync::utils::http::create_client;

#[derive(Parser, Debug)]
#[command(name = "bansync", version, about = "Unified game-server ban aggregator")]
struct Cli {
    /// Path to the configuration document
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the scheduler daemon
    Run,
    /// Run a single reconciliation pass and exit
    Once {
        /// Restrict to one configured source
        #[arg(long)]
        source: Option<String>,
        /// Permit deletions (complete refresh)
        #[arg(long)]
        complete: bool,
    },
    /// Check configuration and the adapter registry without touching
    /// the network
    Validate,
    /// Print stored bans for a player key
    Lookup { ckey: String },
    /// List the ban sources known to the store
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Dotted flags overlay the config document; everything else is CLI.
    let (args, overrides) = extract_overrides(std::env::args().collect());
    let cli = Cli::parse_from(args);

    let config = load_config(Path::new(&cli.config), &overrides)?;

    match cli.command {
        Command::Run => run_daemon(&config).await,
        Command::Once { source, complete } => run_once(&config, source, complete).await,
        Command::Validate => run_validate(&config),
        Command::Lookup { ckey } => run_lookup(&config, &ckey).await,
        Command::Sources => run_sources(&config).await,
    }
}

/// Start the scheduler and block until ctrl-c.
async fn run_daemon(config: &AppConfig) -> Result<()> {
    let client = create_client(&config.http)?;
    let store = BanStore::connect(&config.db_config).await?;
    info!(dialect = store.dialect().as_str(), "connected to ban store");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let scheduler = Scheduler::new(Reconciler::new(store), shutdown_rx);
    scheduler.run(config, &client).await
}

/// Run every (or one) adapter once, outside the scheduler.
async fn run_once(config: &AppConfig, source: Option<String>, complete: bool) -> Result<()> {
    let client = create_client(&config.http)?;
    let store = BanStore::connect(&config.db_config).await?;
    let reconciler = Reconciler::new(store);

    let refresh = if complete {
        RefreshKind::Complete
    } else {
        RefreshKind::Incremental
    };

    let mut adapters = build_adapters(config, &client)?;
    if let Some(name) = &source {
        adapters.retain(|adapter| adapter.name() == name.as_str());
        if adapters.is_empty() {
            return Err(AppError::validation(format!(
                "no enabled source named '{name}' in configuration"
            )));
        }
    }

    let mut failures = 0;
    for adapter in adapters {
        match reconciler.run(adapter.as_ref(), refresh).await {
            Ok(stats) => {
                println!(
                    "{}: fetched {}, inserted {}, updated {}, deleted {}{}",
                    stats.adapter,
                    stats.fetched,
                    stats.inserted,
                    stats.updated,
                    stats.deleted,
                    if stats.skipped { " (skipped: unavailable)" } else { "" },
                );
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: failed: {e}", adapter.name());
            }
        }
    }

    if failures > 0 {
        return Err(AppError::validation(format!(
            "{failures} reconciliation job(s) failed"
        )));
    }
    Ok(())
}

/// Validate configuration and enumerate the adapter registry.
fn run_validate(config: &AppConfig) -> Result<()> {
    let client = create_client(&config.http)?;
    let adapters = build_adapters(config, &client)?;

    println!("Configuration OK");
    println!("  Store dialect: {}", config.db_config.db_type.as_str());
    println!("  HTTP timeout: {}s", config.http.timeout_secs);
    println!("  Adapters ({}):", adapters.len());
    for adapter in &adapters {
        println!(
            "    - {} (stable ids: {}, sources: {})",
            adapter.name(),
            adapter.supports_ban_ids(),
            adapter.sources().join(", "),
        );
    }
    Ok(())
}

/// Print every stored ban for a player key.
async fn run_lookup(config: &AppConfig, ckey: &str) -> Result<()> {
    let store = BanStore::connect(&config.db_config).await?;
    let bans = store.bans_by_ckey(ckey).await?;

    if bans.is_empty() {
        println!("No bans recorded for '{ckey}'");
        return Ok(());
    }

    println!("{} ban(s):", bans.len());
    for ban in &bans {
        println!("{}", format_ban(ban));
    }
    Ok(())
}

/// List every source the store has seen.
async fn run_sources(config: &AppConfig) -> Result<()> {
    let store = BanStore::connect(&config.db_config).await?;
    let sources = store.sources().await?;

    if sources.is_empty() {
        println!("No ban sources registered yet");
        return Ok(());
    }

    for source in &sources {
        println!("  {:>4}  {}", source.id, source.name);
    }
    Ok(())
}

fn format_ban(ban: &Ban) -> String {
    let scope = if ban.jobs.is_empty() {
        "server".to_string()
    } else {
        ban.jobs.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    let expiry = ban
        .expires
        .map(|e| e.format("until %Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "permanent".to_string());
    let lifted = ban
        .unbanned_by
        .as_deref()
        .map(|by| format!(" [unbanned by {by}]"))
        .unwrap_or_default();

    format!(
        "  [{}] {} banned {} by {} ({scope}, {expiry}){lifted}: {}",
        ban.source_name,
        ban.ckey,
        ban.banned_on.format("%Y-%m-%d %H:%M UTC"),
        ban.banned_by,
        ban.reason,
    )
}
