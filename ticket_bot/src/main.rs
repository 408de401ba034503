//! Support-ticket bot: CLI parsing, env-file loading, config validation,
//! service wiring and graceful shutdown.

use std::{env, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use discord_api::DiscordClient;
use tokio::sync::watch;
use tracing::{error, info, warn};

use ticket_bot::{
    config::BotConfig,
    handler::BotHandler,
    interactions::InteractionRouter,
    logging::init_logging,
    provider::{ChannelProvider, DiscordChannelProvider},
    reconciler::{Reconciler, ReconcilerSettings},
    relay::Relay,
    scheduler::Scheduler,
    store::{sqlite::SqliteStore, TicketStore},
    suggestions::SuggestionService,
    tickets::TicketService,
    transcript::TranscriptRenderer,
};

/// Run the support-ticket bot with the given JSON configuration file.
#[derive(Debug, Parser)]
#[command(name = "ticket_bot", version, about)]
struct Args {
    /// Load environment variables from a .env file.
    #[arg(short, long, value_name = "FILE")]
    env_file: Option<String>,

    /// Bot token. Falls back to DISCORD_TOKEN.
    #[arg(short, long)]
    token: Option<String>,

    /// HTTP/WS proxy URL (http:// or https://).
    #[arg(short = 'x', long)]
    proxy: Option<String>,

    /// SQLite database file. Overrides `database_path` from the config.
    #[arg(short, long, value_name = "FILE")]
    database: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(env_path) = &args.env_file {
        dotenvy::from_filename(env_path)
            .with_context(|| format!("failed to load env file '{env_path}'"))?;
    }

    let token = match args.token.clone().or_else(|| env::var("DISCORD_TOKEN").ok()) {
        Some(token) if !token.trim().is_empty() => token,
        _ => bail!("no token found: pass --token or set DISCORD_TOKEN (optionally via --env-file)"),
    };

    if let Some(proxy) = &args.proxy {
        if !proxy.starts_with("http://") && !proxy.starts_with("https://") {
            bail!("proxy URL must start with http:// or https://");
        }
    }

    let mut config = BotConfig::load(&args.config)
        .with_context(|| format!("invalid config file '{}'", args.config))?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    info!(config = %args.config, database = %config.database_path, "configuration loaded");
    let config = Arc::new(config);

    let store: Arc<dyn TicketStore> = Arc::new(
        SqliteStore::new(&config.database_path)
            .with_context(|| format!("failed to open database '{}'", config.database_path))?,
    );

    let client = DiscordClient::new(None, args.proxy.clone()).context("failed to build HTTP client")?;
    client.set_token(Some(token)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let transcripts = Arc::new(TranscriptRenderer::new());
    let provider: Arc<dyn ChannelProvider> = Arc::new(DiscordChannelProvider::new(
        client.clone(),
        config.guild_id.as_str(),
        config.support_role_id.as_str(),
        config.support_category_id.as_str(),
    ));
    let relay = Relay::new(store.clone(), provider.clone(), config.message_chunk_size);
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        provider,
        relay.clone(),
        transcripts.clone(),
        ReconcilerSettings {
            grace_delay: config.timings.grace_delay(),
            orphan_sweep_window: config.timings.orphan_sweep_window(),
        },
        shutdown_rx.clone(),
    ));
    let nudge = reconciler.nudger();

    let tickets = TicketService::new(
        store.clone(),
        client.clone(),
        config.clone(),
        nudge.clone(),
        transcripts,
    );
    let suggestions = Arc::new(SuggestionService::new(store.clone(), client.clone(), config.clone()));
    let router = InteractionRouter::new(client.clone(), config.clone(), tickets, suggestions.clone());

    client
        .event_handler(BotHandler::new(
            config.clone(),
            store,
            router,
            suggestions.clone(),
            nudge,
        ))
        .await
        .context("failed to register event handler")?;

    let scheduler = Scheduler::start(reconciler, relay, suggestions, &config.timings, shutdown_rx);

    client.start().await.context("failed to open the Discord gateway")?;
    info!("bot is running, press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl+C, shutting down"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = client.close_ws(Some("Shutting down")).await {
        warn!(error = %e, "error while closing the gateway");
    }
    scheduler.join().await;
    info!("stopped");
    Ok(())
}
