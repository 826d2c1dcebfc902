use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Facet-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    /// Facet ladder, coarsest level first
    #[serde(default)]
    pub facets: Vec<FacetConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub workers: u32,

    /// Records served per remote page
    pub page_size: u32,

    /// Highest page index the remote will serve for one query
    pub max_pages: u32,

    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Lower bound of the randomized pre-request delay (milliseconds)
    pub jitter_min_ms: u64,

    /// Upper bound of the randomized pre-request delay (milliseconds)
    pub jitter_max_ms: u64,

    /// Attempts per page before giving up on it
    pub retry_budget: u32,

    /// Backoff after a transient failure (milliseconds)
    pub retry_backoff_ms: u64,

    /// Cooldown after an HTTP 429 (milliseconds)
    pub rate_limit_cooldown_ms: u64,

    /// Stall monitor sample period (milliseconds)
    pub stall_interval_ms: u64,

    /// Requests that must have been issued before a stall can be declared
    pub stall_min_requests: u64,

    /// Consecutive stagnant samples that count as a stall
    pub stall_samples: u32,

    /// Progress event cadence (milliseconds)
    pub progress_interval_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            page_size: 20,
            max_pages: 150,
            request_timeout_ms: 10_000,
            jitter_min_ms: 500,
            jitter_max_ms: 1_000,
            retry_budget: 3,
            retry_backoff_ms: 1_000,
            rate_limit_cooldown_ms: 30_000,
            stall_interval_ms: 30_000,
            stall_min_requests: 20,
            stall_samples: 2,
            progress_interval_ms: 5_000,
        }
    }
}

impl CrawlerConfig {
    /// Largest declared total that can be paged through in full
    pub fn page_capacity(&self) -> u64 {
        u64::from(self.max_pages) * u64::from(self.page_size)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    pub fn stall_interval(&self) -> Duration {
        Duration::from_millis(self.stall_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Remote site configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Adapter name ("job104" or "job1111")
    pub kind: String,

    /// Scheme and host of the remote API
    pub base_url: String,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Optional Referer header
    #[serde(default)]
    pub referer: Option<String>,

    /// Site-specific sort key
    #[serde(default)]
    pub sort: Option<String>,

    /// Parameters applied to every query
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// One level of the facet ladder
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FacetConfig {
    /// Unique level name, used in provenance labels
    pub name: String,

    /// Name of an earlier level whose high-density values this level refines
    #[serde(default)]
    pub refines: Option<String>,

    /// Enumerated values (empty for refining levels)
    #[serde(default)]
    pub values: Vec<FacetValueConfig>,
}

/// One enumerated facet value
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FacetValueConfig {
    pub label: String,

    /// Request parameters this value sets
    pub params: BTreeMap<String, String>,

    /// Whether a refining level should expand this value
    #[serde(default)]
    pub high_density: bool,

    /// Narrower values used by a refining level
    #[serde(default)]
    pub children: Vec<FacetValueConfig>,
}
