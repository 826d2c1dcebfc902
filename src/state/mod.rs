//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `DedupStore`: capped, deduplicated record accumulator
//! - `CrawlState`: per-search cancellation, counters and stop reason

mod crawl_state;
mod dedup;

// Re-export main types
pub use crawl_state::{CrawlSnapshot, CrawlState, StopReason};
pub use dedup::DedupStore;
