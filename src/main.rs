use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use autoria_scraper::application::crawler::{CatalogCrawler, CrawlOptions};
use autoria_scraper::domain::repositories::CarRepository;
use autoria_scraper::domain::services::DetailExtractor;
use autoria_scraper::infrastructure::car_repository::PgCarRepository;
use autoria_scraper::infrastructure::config::Settings;
use autoria_scraper::infrastructure::database_connection::DatabaseConnection;
use autoria_scraper::infrastructure::html_parser::CarPageExtractor;
use autoria_scraper::infrastructure::http_client::HttpClient;
use autoria_scraper::infrastructure::logging::init_logging;
use autoria_scraper::infrastructure::phone::{PhoneResolver, PhoneRetryPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("Starting AutoRia scraper. URL: {}", settings.start_url);

    let db = DatabaseConnection::connect(&settings.database_url).await?;
    db.ensure_schema().await?;

    let http = Arc::new(HttpClient::new(settings.http.clone())?);
    let extractor: Arc<dyn DetailExtractor> = Arc::new(CarPageExtractor::new()?);
    let resolver = Arc::new(PhoneResolver::new(
        Arc::clone(&http),
        PhoneRetryPolicy::from_settings(&settings.retry),
    ));
    let repo: Arc<dyn CarRepository> = Arc::new(PgCarRepository::new(db.pool().clone()));

    let crawler = CatalogCrawler::new(
        http,
        extractor,
        resolver,
        repo,
        CrawlOptions::from_settings(&settings),
    )?;

    tokio::select! {
        summary = crawler.run(&settings.start_url) => {
            info!("Scraping completed. {}", summary);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Termination signal received, shutting down");
        }
    }

    Ok(())
}
