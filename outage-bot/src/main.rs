use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use outage_bot::{Bot, StartupError, TelegramApi};
use outage_core::{
    spawn_poller, AppConfig, ConfigError, Dispatcher, JsonSubscriptionStore, PollConfig, Refresher,
    SnapshotCache, VkWallClient,
};
use reqwest::{redirect, ClientBuilder};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "outage-bot", about = "Telegram notifier for water-outage announcements")]
struct Args {
    /// Path to config.json (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "bot stopped");
            ExitCode::FAILURE
        }
    }
}

struct LoadedConfig {
    config: AppConfig,
    dir: PathBuf,
    path: PathBuf,
    fallback: Option<ConfigError>,
}

fn load_config(args: &Args) -> Result<LoadedConfig, ConfigError> {
    let (dir, path) = match &args.config {
        Some(path) => {
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (dir, path.clone())
        }
        None => (AppConfig::config_dir()?, AppConfig::default_config_path()?),
    };
    let (config, fallback) = match AppConfig::load_from(&path) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    };
    Ok(LoadedConfig {
        config,
        dir,
        path,
        fallback,
    })
}

async fn run(args: Args) -> Result<(), StartupError> {
    let loaded = load_config(&args);
    let debug = matches!(&loaded, Ok(loaded) if loaded.config.telegram.debug);
    init_tracing(debug);

    let LoadedConfig {
        config,
        dir: config_dir,
        path: config_path,
        fallback,
    } = loaded?;
    if let Some(err) = fallback {
        warn!(error = %err, path = %config_path.display(), "unable to load configuration, using defaults");
    }

    if config.telegram.token.is_empty() {
        return Err(StartupError::MissingToken);
    }

    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent("water-outage-bot/0.1")
        .build()?;

    let api = Arc::new(TelegramApi::new(client.clone(), &config.telegram)?);
    let me = api.get_me().await?;
    info!(username = ?me.username, "authorized on telegram");

    let feed = Arc::new(VkWallClient::new(client, &config.feed)?);
    let cache = SnapshotCache::new(config.schedule.cache_ttl());
    let refresher = Arc::new(Refresher::new(feed, cache));

    let subscriptions_path = config.subscriptions_path(&config_dir);
    let store = Arc::new(JsonSubscriptionStore::load_from(&subscriptions_path).await);
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), api.clone()));

    let poller = spawn_poller(
        refresher.clone(),
        dispatcher,
        PollConfig::from(&config.schedule),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let bot = Bot::new(api, store, refresher);
    let bot_task = tokio::spawn(async move { bot.run(shutdown_rx).await });
    info!("bot started");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to listen for shutdown signal");
    }
    info!("shutting down");
    let _ = shutdown_tx.send(());
    if let Err(err) = bot_task.await {
        error!(error = %err, "bot task failed");
    }
    if let Err(err) = poller.stop().await {
        error!(error = %err, "poller task failed");
    }
    Ok(())
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
