use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use threadslapper::{
    Config, DiscordClient, ErrorCircuitBreaker, FeedSource, HttpFeedSource, Platform,
    PollScheduler, Result, SlapperError,
};

/// Publish a discussion thread for every new podcast episode.
#[derive(Parser, Debug)]
#[command(name = "threadslapper", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config = match Config::load_with_env(&args.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    if let Err(e) = threadslapper::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        threadslapper::logging::init_console_only(&config.logging.level);
    }

    info!("threadslapper {}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let feeds = config.feed_configs()?;
    let token = config
        .bot
        .token
        .clone()
        .ok_or_else(|| SlapperError::Config("bot token is not set".to_string()))?;

    let platform: Arc<dyn Platform> =
        Arc::new(DiscordClient::new(token, config.bot.api_base_url.clone())?);
    let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new()?);

    let mut scheduler = PollScheduler::new(feeds, source, platform)
        .with_interval(config.bot.check_interval())
        .with_breaker(ErrorCircuitBreaker::new(config.bot.max_feed_errors));

    if config.bot.startup_latest_episode_check {
        scheduler.startup_check().await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current check");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {e}"),
        }
    });

    scheduler.run(shutdown_rx).await;
    Ok(())
}
