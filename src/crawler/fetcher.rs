//! Rate-limited page fetcher
//!
//! This module issues every request the crawler makes:
//! - Building HTTP clients with the site's headers and a fixed timeout
//! - Randomized, cancellable pre-request delay
//! - Retry logic with a small fixed budget per page
//! - Classification of the remote's response

use crate::config::{CrawlerConfig, SiteConfig};
use crate::query::Query;
use crate::site::{PageResult, SiteAdapter};
use crate::state::CrawlState;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Terminal failure for one page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote refuses further requests; the whole crawl should stop
    #[error("Hard block (HTTP {status})")]
    HardBlock { status: u16 },

    /// This page could not be fetched; only it should be skipped
    #[error("Page unavailable: {reason}")]
    Unavailable { reason: String },

    /// The crawl was cancelled while this fetch was waiting
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Outcome of a single HTTP attempt
#[derive(Debug)]
enum Attempt {
    Page(PageResult),
    EndOfData,
    Forbidden(u16),
    RateLimited,
    Transient(String),
}

/// Builds an HTTP client with the site's identity headers
///
/// # Arguments
///
/// * `site` - The site configuration (user agent and referer)
/// * `crawler` - The crawler configuration (request timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use facet_crawl::config::{CrawlerConfig, SiteConfig};
/// use facet_crawl::crawler::build_http_client;
///
/// let site = SiteConfig {
///     kind: "job104".to_string(),
///     base_url: "https://www.104.com.tw".to_string(),
///     user_agent: "Mozilla/5.0".to_string(),
///     referer: Some("https://www.104.com.tw/jobs/search/".to_string()),
///     sort: None,
///     params: Default::default(),
/// };
///
/// let client = build_http_client(&site, &CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    site: &SiteConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Some(referer) = &site.referer {
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
    }

    let timeout = crawler.request_timeout();

    Client::builder()
        .user_agent(site.user_agent.as_str())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sleeps for `duration` unless the crawl is cancelled first
pub async fn sleep_or_cancel(
    duration: Duration,
    token: &CancellationToken,
) -> Result<(), FetchError> {
    if token.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Fetches pages of (sub-)queries from one remote site
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    site: Arc<dyn SiteAdapter>,
    config: Arc<CrawlerConfig>,
}

impl PageFetcher {
    pub fn new(client: Client, site: Arc<dyn SiteAdapter>, config: Arc<CrawlerConfig>) -> Self {
        Self {
            client,
            site,
            config,
        }
    }

    fn jitter(&self) -> Duration {
        let (min, max) = (self.config.jitter_min_ms, self.config.jitter_max_ms);
        if max == 0 || min > max {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Fetches one page of a query with full retry handling
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 200, well-formed | Return the page |
    /// | HTTP 200, malformed | Retry after backoff |
    /// | HTTP 429 | Retry after cooldown; budget exhausted → HardBlock |
    /// | HTTP 403 | Immediate → HardBlock |
    /// | HTTP 400/404/416/422 | Immediate → empty page (no more data) |
    /// | HTTP 5xx, other | Retry after backoff; budget exhausted → Unavailable |
    /// | Timeout, connection error | Retry after backoff; budget exhausted → Unavailable |
    ///
    /// Every wait observes the crawl's cancellation token.
    ///
    /// # Arguments
    ///
    /// * `query` - The (sub-)query to fetch
    /// * `page` - 1-based page number
    /// * `state` - Shared crawl state (cancellation and request counter)
    pub async fn fetch(
        &self,
        query: &Query,
        page: u32,
        state: &CrawlState,
    ) -> Result<PageResult, FetchError> {
        let token = state.cancel_token();
        sleep_or_cancel(self.jitter(), token).await?;

        let budget = self.config.retry_budget.max(1);
        let mut last_failure = String::new();
        let mut rate_limited = false;

        for attempt in 1..=budget {
            if token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            state.record_request();
            match self.attempt(query, page).await {
                Attempt::Page(result) => return Ok(result),
                Attempt::EndOfData => {
                    tracing::debug!("{} page {}: no more data", query, page);
                    return Ok(PageResult::exhausted());
                }
                Attempt::Forbidden(status) => {
                    tracing::error!("{} page {}: forbidden (HTTP {})", query, page, status);
                    return Err(FetchError::HardBlock { status });
                }
                Attempt::RateLimited => {
                    rate_limited = true;
                    last_failure = "HTTP 429".to_string();
                    tracing::warn!(
                        "{} page {}: rate limited (attempt {}/{})",
                        query,
                        page,
                        attempt,
                        budget
                    );
                    if attempt < budget {
                        sleep_or_cancel(self.config.rate_limit_cooldown(), token).await?;
                    }
                }
                Attempt::Transient(reason) => {
                    rate_limited = false;
                    tracing::warn!(
                        "{} page {}: {} (attempt {}/{})",
                        query,
                        page,
                        reason,
                        attempt,
                        budget
                    );
                    last_failure = reason;
                    if attempt < budget {
                        sleep_or_cancel(self.config.retry_backoff(), token).await?;
                    }
                }
            }
        }

        if rate_limited {
            tracing::error!("{} page {}: rate limit persisted, hard block", query, page);
            Err(FetchError::HardBlock {
                status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            })
        } else {
            Err(FetchError::Unavailable {
                reason: last_failure,
            })
        }
    }

    async fn attempt(&self, query: &Query, page: u32) -> Attempt {
        let request = self.site.build_request(&self.client, query, page);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Transient(describe_error(&e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(body) => match self.site.parse_page(&body) {
                    Ok(result) => Attempt::Page(result),
                    Err(e) => Attempt::Transient(format!("malformed page: {}", e)),
                },
                Err(e) => Attempt::Transient(describe_error(&e)),
            };
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => Attempt::RateLimited,
            StatusCode::FORBIDDEN => Attempt::Forbidden(status.as_u16()),
            StatusCode::BAD_REQUEST
            | StatusCode::NOT_FOUND
            | StatusCode::RANGE_NOT_SATISFIABLE
            | StatusCode::UNPROCESSABLE_ENTITY => Attempt::EndOfData,
            _ => Attempt::Transient(format!("HTTP {}", status.as_u16())),
        }
    }
}

fn describe_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        e.to_string()
    }
}
