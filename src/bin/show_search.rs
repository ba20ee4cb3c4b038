//! Runs one reconciled show search and prints the stored shows.
//!
//! Usage: `show_search <query>`

use std::sync::Arc;

use anyhow::Result;
use anyhow::bail;
use dotenv::dotenv;
use shows_bot::config::Config;
use shows_bot::logging::setup_logging;
use shows_bot::provider::providers::Providers;
use shows_bot::repository::Repository;
use shows_bot::service::reconciliation_service::ReconciliationService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        bail!("Usage: show_search <query>");
    }

    let mut config = Config::new();
    config.load()?;
    // Searching never sends messages, so no Telegram token is needed.
    config.features.notifications = false;
    config.validate()?;
    setup_logging(&config)?;

    let db = Arc::new(Repository::new(&config.db_url, &config.db_path).await?);
    db.run_migrations().await?;
    let providers = Arc::new(Providers::from_config(&config)?);
    let service = ReconciliationService::new(db.clone(), providers, config.max_results);

    let shows = service.search(&query).await;
    if shows.is_empty() {
        println!("No results for `{query}`.");
    }
    for show in shows {
        println!(
            "{:<20} {} [{}] {}",
            show.id,
            show.name,
            show.first_air_date
                .map(|d| d.format("%Y").to_string())
                .unwrap_or_else(|| "----".to_string()),
            show.cross_ref_id.unwrap_or_default()
        );
    }

    db.close().await;
    Ok(())
}
