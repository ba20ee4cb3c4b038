//! Application entry point for shows-bot.
//!
//! Initializes all components and starts the notification scheduler.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dotenv::dotenv;
use log::debug;
use log::info;
use shows_bot::config::Config;
use shows_bot::logging::setup_logging;
use shows_bot::notifier::telegram_notifier::TelegramNotifier;
use shows_bot::provider::providers::Providers;
use shows_bot::repository::Repository;
use shows_bot::service::Services;
use shows_bot::task::notification_scheduler::NotificationScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = load_config()?;

    let db = setup_database(&config, init_start).await?;
    let providers = Arc::new(Providers::from_config(&config)?);
    let notifier = Arc::new(TelegramNotifier::new(&config.telegram_token)?);
    let services = Arc::new(Services::new(&config, db.clone(), providers, notifier)?);

    let scheduler = setup_scheduler(&config, &services, init_start)?;

    run(init_start).await?;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    db.close().await;
    info!("Shutdown complete.");
    Ok(())
}

fn load_config() -> Result<Arc<Config>> {
    debug!("Loading configuration...");
    let mut config = Config::new();
    config.load()?;
    config.validate()?;
    let config = Arc::new(config);
    setup_logging(&config)?;
    info!("Starting shows-bot...");
    Ok(config)
}

async fn setup_database(config: &Config, init_start: Instant) -> Result<Arc<Repository>> {
    debug!("Setting up Repository...");
    let db = Arc::new(Repository::new(&config.db_url, &config.db_path).await?);

    info!("Running database migrations...");
    db.run_migrations().await?;
    info!(
        "Database setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );

    Ok(db)
}

fn setup_scheduler(
    config: &Config,
    services: &Services,
    init_start: Instant,
) -> Result<Option<Arc<NotificationScheduler>>> {
    if !config.features.notifications {
        info!("Notifications are disabled.");
        return Ok(None);
    }
    debug!("Setting up NotificationScheduler...");

    let scheduler = NotificationScheduler::new(
        services.subscriptions.clone(),
        services.episodes.clone(),
        services.notifications.clone(),
        config.check_interval,
        config.sweep_workers,
    );
    scheduler.clone().start()?;

    info!(
        "Scheduler setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );
    Ok(Some(scheduler))
}

async fn run(init_start: Instant) -> Result<()> {
    info!(
        "shows-bot is up in {:.2}s. Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");

    Ok(())
}
