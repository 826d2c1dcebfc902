//! Facet-Crawl: an adaptive partitioned crawler for capped search APIs
//!
//! This crate retrieves the complete result set of a paginated, rate-limited
//! search API that refuses to serve more than a fixed number of pages per
//! query. Over-large queries are split along a ladder of facets (region,
//! sub-region, salary bracket, ...) until every partition is small enough to
//! page through, and the partitions' records are merged without duplicates.

pub mod config;
pub mod crawler;
pub mod output;
pub mod query;
pub mod site;
pub mod state;

use thiserror::Error;

/// Main error type for Facet-Crawl operations
///
/// Remote misbehaviour (rate limiting, blocks, malformed pages) never surfaces
/// here; it degrades into a partial result instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search keyword cannot be empty")]
    EmptyKeyword,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Unknown site adapter: {0}")]
    UnknownSite(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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

    #[error("Invalid facet ladder: {0}")]
    InvalidFacet(String),
}

/// Result type alias for Facet-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, SearchOptions, SearchOutcome};
pub use query::{Constraint, FacetLadder, Query};
pub use site::{RawRecord, SiteAdapter};
pub use state::StopReason;
