//! Crawler module for partitioned search retrieval
//!
//! This module contains the core crawling logic, including:
//! - Page fetching with jitter, retries and rate-limit cooldowns
//! - Partition planning along the facet ladder
//! - Task scheduling on a bounded worker pool
//! - Stall detection and progress reporting
//! - Overall search coordination

mod coordinator;
mod fetcher;
mod monitor;
mod planner;
mod scheduler;

pub use coordinator::{Crawler, SearchOptions, SearchOutcome};
pub use fetcher::{build_http_client, sleep_or_cancel, FetchError, PageFetcher};
pub use monitor::{LogProgress, ProgressEvent, ProgressSink, StallDetector};
pub use planner::{PartitionPlanner, Plan};
pub use scheduler::{Scheduler, Task, TaskOutcome};

use crate::config::Config;
use crate::CrawlError;

/// Runs a single search
///
/// This is the one-shot entry point. It will:
/// 1. Build the site adapter and HTTP client
/// 2. Probe the keyword and split it along the facet ladder as needed
/// 3. Page through every small-enough partition
/// 4. Return the deduplicated records with the declared total
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `keyword` - Search keyword
/// * `max_records` - Cap on returned records
///
/// # Returns
///
/// * `Ok(SearchOutcome)` - Search finished, possibly early
/// * `Err(CrawlError)` - Invalid input or client setup failed
pub async fn search(
    config: Config,
    keyword: &str,
    max_records: usize,
) -> Result<SearchOutcome, CrawlError> {
    Crawler::new(config)?
        .search(keyword, max_records, &SearchOptions::default())
        .await
}
