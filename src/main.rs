//! Session coordinator CLI.
//!
//! Drives the session services against a live web API.
//!
//! # Architecture Overview
//!
//! ```text
//!   session-coordinator [--config FILE] <command>
//!          │
//!          ▼
//!   ┌──────────────┐    ┌──────────────────────────────────────────────┐
//!   │    config    │───▶│               SessionContext                 │
//!   │ (TOML + CLI) │    │                                              │
//!   └──────────────┘    │  ┌──────────────┐  ┌───────────────────────┐ │
//!                       │  │ preferences  │  │ resilience            │ │
//!   prefs ─────────────────▶│ store + HTTP │  │ circuit breaker       │◀──── breaker
//!                       │  └──────────────┘  └───────────────────────┘ │
//!                       │  ┌──────────────────────────────────────────┐│
//!   bulk-fetch ────────────▶│ stream: tracker ◀── SSE transport        ││
//!                       │  └──────────────────────────────────────────┘│
//!                       └──────────────────────────────────────────────┘
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use session_coordinator::config::{self, ClientConfig};
use session_coordinator::lifecycle::shutdown_signal;
use session_coordinator::observability::{logging, metrics};
use session_coordinator::preferences::{LoadOutcome, SaveOutcome};
use session_coordinator::stream::StreamPhase;
use session_coordinator::SessionContext;

#[derive(Parser)]
#[command(name = "session-coordinator")]
#[command(about = "Preference cache, AI call guard and bulk fetch client", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.base_url`.
    #[arg(long)]
    base_url: Option<String>,

    /// Override `server.session_token`.
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and write user preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
    /// Inspect or reset the AI call guard
    Breaker {
        #[command(subcommand)]
        action: BreakerAction,
    },
    /// Run the bulk metadata fetch and follow its log
    BulkFetch,
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print the whole preference document
    Show,
    /// Print one preference
    Get {
        key: String,
        /// JSON value printed when the key is unset
        #[arg(long, default_value = "null")]
        default: String,
    },
    /// Write one preference (JSON, or a plain string)
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum BreakerAction {
    /// Show marked keys and the cooldown
    Status,
    /// Clear every flag and the cooldown
    Reset,
    /// Start a cooldown
    Trigger {
        /// Seconds; the configured default when omitted
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let config = config::apply_server_overrides(loaded, cli.base_url, cli.token)
        .context("invalid command-line override")?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "session-coordinator starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let context = SessionContext::from_config(&config)?;

    match cli.command {
        Commands::Prefs { action } => run_prefs(&context, action).await,
        Commands::Breaker { action } => run_breaker(&context, action),
        Commands::BulkFetch => run_bulk_fetch(&context).await,
    }
}

async fn run_prefs(context: &SessionContext, action: PrefsAction) -> anyhow::Result<()> {
    let store = context.preferences();

    match store.load_all().await {
        LoadOutcome::Loaded { keys } => tracing::debug!(keys, "Preferences loaded"),
        LoadOutcome::Unauthenticated => eprintln!("Not signed in; using locally stored preferences"),
        LoadOutcome::Failed(e) => eprintln!("Could not load preferences: {e}"),
    }

    match action {
        PrefsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&*store.snapshot())?);
        }
        PrefsAction::Get { key, default } => {
            let default = parse_value(default);
            println!("{}", serde_json::to_string_pretty(&store.get(&key, default))?);
        }
        PrefsAction::Set { key, value } => {
            let outcome = store.set(key.clone(), parse_value(value)).await?;
            match outcome {
                SaveOutcome::Persisted => println!("Saved {key}"),
                SaveOutcome::MirroredLocally(e) => println!("Saved {key} locally ({e})"),
                SaveOutcome::Failed(e) => bail!("failed to save {key}: {e}"),
            }
        }
    }

    Ok(())
}

fn run_breaker(context: &SessionContext, action: BreakerAction) -> anyhow::Result<()> {
    let breaker = context.breaker();

    match action {
        BreakerAction::Status => {
            let snapshot = breaker.snapshot();
            match breaker.cooldown_remaining() {
                Some(left) => println!("Cooldown active: {}s remaining", left.as_secs()),
                None => println!("No cooldown"),
            }
            println!("Marked keys: {}", snapshot.fetched.len());
            for key in &snapshot.fetched {
                println!("  {key}");
            }
        }
        BreakerAction::Reset => {
            breaker.reset();
            println!("Guard reset");
        }
        BreakerAction::Trigger { seconds } => {
            let length = match seconds {
                Some(seconds) => {
                    breaker.trigger_cooldown(seconds);
                    Duration::from_secs(seconds)
                }
                None => breaker.trigger_default_cooldown(),
            };
            println!("Cooldown started for {}s", length.as_secs());
        }
    }

    breaker.save_to_file()?;
    Ok(())
}

async fn run_bulk_fetch(context: &SessionContext) -> anyhow::Result<()> {
    let tracker = context.tracker();
    let mut updates = tracker.subscribe();

    tracker.start_fetch();
    let mut printed = 0;
    let mut last = tracker.snapshot();

    let stop = shutdown_signal();
    tokio::pin!(stop);

    loop {
        for entry in last.logs.iter().skip(printed) {
            println!("{entry}");
        }
        printed = printed.max(last.logs.len());

        if !last.is_fetching {
            break;
        }

        tokio::select! {
            changed = updates.changed() => match changed {
                Some(snapshot) => last = snapshot,
                None => break,
            },
            _ = &mut stop => {
                tracker.stop_fetch();
                println!("Stopped");
                return Ok(());
            }
        }
    }

    match last.phase {
        StreamPhase::Errored => bail!("bulk fetch interrupted"),
        _ => Ok(()),
    }
}

fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}
