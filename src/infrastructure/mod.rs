//! Infrastructure module - External concerns
//!
//! HTTP, HTML parsing, persistence, configuration and logging.

pub mod car_repository;
pub mod config;
pub mod database_connection;
pub mod html_parser;
pub mod http_client;
pub mod logging;
pub mod phone;

// Re-export commonly used items
pub use car_repository::PgCarRepository;
pub use config::Settings;
pub use database_connection::DatabaseConnection;
pub use html_parser::{CarPageExtractor, ListingPageParser, next_page_url};
pub use http_client::{HttpClient, HttpClientConfig, HttpError};
pub use logging::init_logging;
pub use phone::{PhoneResolver, PhoneRetryPolicy};
