//! news-harvest: a diversity-first news fetcher with budget-bounded enrichment
//!
//! This crate fetches German-language news feeds from many independent sources,
//! interleaving them by domain so an interrupted run still covers every source,
//! and enriches the stored articles through a metered AI API without ever
//! spending past a configured ceiling.

pub mod cancel;
pub mod config;
pub mod enrich;
pub mod fetch;
pub mod model;
pub mod output;
pub mod retry;
pub mod state;
pub mod storage;
pub mod throttle;
pub mod url;

use thiserror::Error;

/// Main error type for news-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for news-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cancel::CancelSignal;
pub use config::Config;
pub use model::{FeedDescriptor, FetchStrategy, RawItem};
pub use state::{FailureKind, RunStats, RunSummary};
