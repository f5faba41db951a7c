//! # Remindr: upcoming-event reminder service
//!
//! Usage:
//!   remindr run                  # Verify channel, start scheduler, stop on Ctrl-C
//!   remindr trigger              # One manual check-and-dispatch cycle
//!   remindr ledger --limit 20    # Show recent delivery outcomes
//!   remindr prune --days 30      # Drop ledger rows for old triggers
//!   remindr init                 # Write default config

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remindr_channels::{EmailChannel, WebhookChannel};
use remindr_core::traits::{NotifyChannel, ReminderLedger};
use remindr_core::RemindrConfig;
use remindr_scheduler::{ReminderDb, Scheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remindr", version, about = "⏰ Remindr: upcoming-event reminder scheduler")]
struct Cli {
    /// Config file (default: ~/.remindr/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the reminder loop and run until Ctrl-C
    Run,
    /// Run one check-and-dispatch cycle now
    Trigger,
    /// List recent ledger entries
    Ledger {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Delete ledger entries whose trigger time is older than N days
    Prune {
        #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,
    },
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "remindr=debug,remindr_scheduler=debug,remindr_channels=debug"
    } else {
        "remindr=info,remindr_scheduler=info,remindr_channels=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&str>) -> Result<RemindrConfig> {
    let config = match path {
        Some(p) => RemindrConfig::load_from(&expand_path(p))?,
        None => RemindrConfig::load()?,
    };
    Ok(config)
}

fn open_db(config: &RemindrConfig) -> Result<Arc<ReminderDb>> {
    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = ReminderDb::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    tracing::debug!("🗄️ Database: {}", db_path.display());
    Ok(Arc::new(db))
}

/// Email wins when both channels are enabled.
fn build_channel(config: &RemindrConfig) -> Result<Arc<dyn NotifyChannel>> {
    if config.email.enabled {
        return Ok(Arc::new(EmailChannel::new(config.email.clone())?));
    }
    if config.webhook.enabled {
        return Ok(Arc::new(WebhookChannel::new(&config.webhook)));
    }
    anyhow::bail!("No outbound channel enabled: set `enabled = true` under [email] or [webhook]")
}

fn build_scheduler(config: &RemindrConfig) -> Result<(Scheduler, Arc<dyn NotifyChannel>)> {
    let db = open_db(config)?;
    let channel = build_channel(config)?;
    let scheduler = Scheduler::from_config(db.clone(), db, channel.clone(), config)?;
    Ok((scheduler, channel))
}

async fn run(config: &RemindrConfig) -> Result<()> {
    let (scheduler, channel) = build_scheduler(config)?;

    match channel.verify().await {
        Ok(true) => {}
        Ok(false) => anyhow::bail!("Channel '{}' is not ready; scheduler not started", channel.name()),
        Err(e) => anyhow::bail!("Channel '{}' readiness check failed: {e}", channel.name()),
    }

    println!("⏰ Remindr v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   Lead: {}m  Margin: {}m  Tick: {}s  Channel: {}",
        config.scheduler.lead_minutes,
        config.scheduler.margin_minutes,
        config.scheduler.tick_interval_secs,
        channel.name()
    );

    scheduler.start();
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, waiting for the current cycle to finish");
    scheduler.stop().await;
    Ok(())
}

async fn trigger(config: &RemindrConfig) -> Result<()> {
    let (scheduler, _channel) = build_scheduler(config)?;
    let report = scheduler.trigger_now().await;
    println!(
        "{} Dispatched {} reminder(s): {} delivered, {} failed",
        if report.succeeded { "✅" } else { "⚠️" },
        report.dispatched_count,
        report.delivered,
        report.failed
    );
    Ok(())
}

async fn ledger(config: &RemindrConfig, limit: usize) -> Result<()> {
    let db = open_db(config)?;
    let entries = db.recent(limit).await?;
    if entries.is_empty() {
        println!("📭 Ledger is empty");
        return Ok(());
    }
    println!(
        "{:<24} {:<25} {:<7} {:>8}  {:<28} ERROR",
        "EVENT", "TRIGGER", "STATUS", "ATTEMPTS", "DESTINATION"
    );
    for e in entries {
        println!(
            "{:<24} {:<25} {:<7} {:>8}  {:<28} {}",
            e.event_id,
            e.trigger_time.format("%Y-%m-%d %H:%M:%S UTC"),
            e.status,
            e.attempts,
            e.destination,
            e.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

async fn prune(config: &RemindrConfig, days: u32) -> Result<()> {
    let db = open_db(config)?;
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
    let removed = db.prune(cutoff).await?;
    println!("🧹 Removed {removed} ledger entr{} older than {days} day(s)", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

fn init(path: Option<&str>, force: bool) -> Result<()> {
    let path = path.map(expand_path).unwrap_or_else(RemindrConfig::default_path);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    RemindrConfig::default().save_to(&path)?;
    println!("📝 Wrote default config to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    if let Command::Init { force } = cli.command {
        return init(cli.config.as_deref(), force);
    }

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run => run(&config).await,
        Command::Trigger => trigger(&config).await,
        Command::Ledger { limit } => ledger(&config, limit).await,
        Command::Prune { days } => prune(&config, days).await,
        Command::Init { .. } => Ok(()),
    }
}
