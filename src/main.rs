//! # Freightbot — logistics order status & reminder bot for Telegram.
//!
//! Usage:
//!   freightbot                 # run the bot + reminder scheduler
//!   freightbot sync            # one sync pass against the upstream system
//!   freightbot status          # print configuration and store status

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use freightbot_bot::{handle_message, BotContext};
use freightbot_channels::TelegramChannel;
use freightbot_core::config::FreightBotConfig;
use freightbot_core::traits::{
    EventStore, MessageTransport, NotificationLog, OrderDirectory, SubscriptionRegistry,
};
use freightbot_db::{MemStore, SqliteStore};
use freightbot_notify::{Dispatcher, NotificationEngine, Scheduler};
use freightbot_reports::TextReportRenderer;
use freightbot_sync::{import_orders, SyncClient};

#[derive(Parser)]
#[command(
    name = "freightbot",
    version,
    about = "🚢 Freightbot — order status & reminder bot"
)]
struct Cli {
    /// Path to config file (default ~/.freightbot/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the bot and reminder scheduler (default)
    Run,
    /// Pull orders from the upstream system once
    Sync,
    /// Print configuration and store status
    Status,
}

/// Trait-object views over whichever store backend startup produced.
struct Stores {
    events: Arc<dyn EventStore>,
    registry: Arc<dyn SubscriptionRegistry>,
    log: Arc<dyn NotificationLog>,
    directory: Arc<dyn OrderDirectory>,
    label: String,
}

fn wire<S>(store: Arc<S>, label: String) -> Stores
where
    S: EventStore + SubscriptionRegistry + NotificationLog + OrderDirectory + 'static,
{
    Stores {
        events: store.clone(),
        registry: store.clone(),
        log: store.clone(),
        directory: store,
        label,
    }
}

/// Open sqlite; fall back to an in-memory store rather than refusing to
/// start, so the bot keeps answering even when the database is down.
fn open_store(config: &FreightBotConfig) -> Stores {
    let path = shellexpand::tilde(&config.store.db_path).to_string();
    match SqliteStore::open(Path::new(&path)) {
        Ok(store) => {
            tracing::info!("✅ Store opened at {path}");
            wire(Arc::new(store), format!("sqlite:{path}"))
        }
        Err(e) => {
            tracing::warn!("⚠️ Could not open {path}: {e}. Running with an in-memory store.");
            wire(Arc::new(MemStore::new()), "memory (degraded)".into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "freightbot=debug"
    } else {
        "freightbot=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            let mut config = FreightBotConfig::load_from(Path::new(&path))?;
            config.apply_env();
            config
        }
        None => FreightBotConfig::load()?,
    };

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run(config).await,
        Cmd::Sync => sync_once(config).await,
        Cmd::Status => status(config).await,
    }
}

async fn run(config: FreightBotConfig) -> Result<()> {
    config.validate()?;

    let stores = open_store(&config);
    let channel = Arc::new(TelegramChannel::new(config.telegram.clone()));
    match channel.get_me().await {
        Ok(me) => tracing::info!(
            "🤖 Telegram bot: @{}",
            me.username.as_deref().unwrap_or("unknown")
        ),
        Err(e) => tracing::warn!("⚠️ Telegram connectivity check failed: {e}"),
    }

    // Background reminder pipeline, independent of the command path.
    let engine = Arc::new(NotificationEngine::new(
        stores.events.clone(),
        stores.registry.clone(),
        stores.log.clone(),
        config.notify.default_lead_hours,
    ));
    let transport: Arc<dyn MessageTransport> = channel.clone();
    let dispatcher = Dispatcher::new(transport, engine.clone());
    Scheduler::new(
        engine,
        dispatcher,
        Duration::from_secs(config.notify.tick_interval_secs),
        Duration::from_secs(config.notify.startup_delay_secs),
    )
    .spawn();

    let ctx = Arc::new(BotContext {
        directory: stores.directory.clone(),
        events: stores.events.clone(),
        registry: stores.registry.clone(),
        log: stores.log.clone(),
        channel: channel.clone(),
        renderer: Arc::new(TextReportRenderer::new()),
        company: config.company.clone(),
        store_label: stores.label.clone(),
        sync_configured: config.sync.is_configured(),
    });

    let mut updates = channel.start_polling();
    let commands = tokio::spawn(async move {
        while let Some(msg) = updates.next().await {
            let ctx = ctx.clone();
            tokio::spawn(async move { handle_message(&ctx, &msg).await });
        }
    });

    tracing::info!("✅ Freightbot is up. Press Ctrl-C to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        _ = commands => tracing::warn!("Command loop ended"),
    }
    Ok(())
}

async fn sync_once(config: FreightBotConfig) -> Result<()> {
    let stores = open_store(&config);
    let client = SyncClient::new(&config.sync);
    let count = import_orders(&client, stores.directory.as_ref()).await?;
    println!("✅ Imported {count} orders into {}", stores.label);
    Ok(())
}

async fn status(config: FreightBotConfig) -> Result<()> {
    let stores = open_store(&config);
    let orders = stores.directory.order_count().await?;
    let pending = stores.log.unsent().await?.len();
    println!("🗄  Store:   {}", stores.label);
    println!("📦 Orders:  {orders}");
    println!("⏳ Pending reminders: {pending}");
    println!(
        "🤖 Bot token: {}",
        if config.telegram.bot_token.is_empty() {
            "missing"
        } else {
            "set"
        }
    );
    println!(
        "🔄 Sync:    {}",
        if config.sync.is_configured() {
            "configured"
        } else {
            "not configured"
        }
    );
    Ok(())
}
