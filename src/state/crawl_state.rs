use crate::query::Query;
use crate::site::RawRecord;
use crate::state::DedupStore;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a crawl stopped collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Every task ran to completion
    Exhausted,

    /// The requested number of records was collected
    CapReached,

    /// The remote refused further requests
    HardBlock,

    /// Requests kept flowing without yielding new records
    Stalled,
}

impl StopReason {
    /// Returns true if the crawl ended before running out of work
    pub fn is_early(&self) -> bool {
        !matches!(self, Self::Exhausted)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Exhausted => "exhausted",
            Self::CapReached => "cap reached",
            Self::HardBlock => "hard block",
            Self::Stalled => "stalled",
        };
        f.write_str(text)
    }
}

impl Serialize for StopReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Point-in-time view of crawl counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlSnapshot {
    pub records: usize,
    pub requests: u64,
    pub duplicates: u64,
    pub pages_fetched: u64,
    pub partitions_probed: u64,
}

/// State shared by every task of one search
///
/// Created fresh for each search and dropped when it returns, so
/// cancellation and deduplication never leak between searches.
#[derive(Debug)]
pub struct CrawlState {
    cancel: CancellationToken,
    store: DedupStore,
    requests: AtomicU64,
    pages_fetched: AtomicU64,
    partitions_probed: AtomicU64,
    last_progress: Mutex<Instant>,
    stop_reason: Mutex<Option<StopReason>>,
    declared_totals: Mutex<HashMap<Query, u64>>,
}

impl CrawlState {
    /// Creates state for a search capped at `cap` records
    pub fn new(cap: usize) -> Self {
        Self {
            cancel: CancellationToken::new(),
            store: DedupStore::new(cap),
            requests: AtomicU64::new(0),
            pages_fetched: AtomicU64::new(0),
            partitions_probed: AtomicU64::new(0),
            last_progress: Mutex::new(Instant::now()),
            stop_reason: Mutex::new(None),
            declared_totals: Mutex::new(HashMap::new()),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Stops the crawl, recording the first reason given
    ///
    /// # Returns
    ///
    /// `true` if this call was the one that stopped the crawl
    pub fn stop(&self, reason: StopReason) -> bool {
        let mut slot = self
            .stop_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let first = slot.is_none();
        if first {
            *slot = Some(reason);
            tracing::info!("Stopping crawl: {}", reason);
        }
        drop(slot);
        self.cancel.cancel();
        first
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *self
            .stop_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges a page of records into the store, returning how many were new
    pub fn merge(&self, records: Vec<RawRecord>, label: &str) -> usize {
        let added = self.store.add_records(records, label);
        if added > 0 {
            *self
                .last_progress
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        }
        added
    }

    /// Time since the store last grew
    pub fn idle_for(&self) -> Duration {
        self.last_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Records the declared total for a query and returns the authoritative one
    ///
    /// The first observation per query wins; later pages of the same query
    /// may report a drifting count and are ignored for planning.
    pub fn declare_total(&self, query: &Query, total: u64) -> u64 {
        let mut totals = self
            .declared_totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *totals.entry(query.clone()).or_insert(total)
    }

    /// The first declared total observed for a query, if any
    pub fn declared_total(&self, query: &Query) -> Option<u64> {
        self.declared_totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .copied()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(&self) {
        self.partitions_probed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CrawlSnapshot {
        CrawlSnapshot {
            records: self.store.size(),
            requests: self.requests(),
            duplicates: self.store.duplicates(),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            partitions_probed: self.partitions_probed.load(Ordering::Relaxed),
        }
    }

    /// Consumes the state, yielding the collected records
    pub fn into_records(self) -> Vec<RawRecord> {
        self.store.into_records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_stop_reason_wins() {
        let state = CrawlState::new(10);
        assert!(!state.is_cancelled());

        assert!(state.stop(StopReason::HardBlock));
        assert!(!state.stop(StopReason::Stalled));

        assert!(state.is_cancelled());
        assert_eq!(state.stop_reason(), Some(StopReason::HardBlock));
    }

    #[test]
    fn test_first_declared_total_is_authoritative() {
        let state = CrawlState::new(10);
        let query = Query::new("rust");

        assert_eq!(state.declared_total(&query), None);
        assert_eq!(state.declare_total(&query, 120), 120);
        assert_eq!(state.declare_total(&query, 135), 120);
        assert_eq!(state.declared_total(&query), Some(120));
    }

    #[test]
    fn test_declared_totals_are_per_query_not_per_label() {
        use crate::query::Constraint;
        use std::collections::BTreeMap;

        let narrow = |area: &str| Constraint {
            facet: "region".to_string(),
            label: "north".to_string(),
            params: BTreeMap::from([("area".to_string(), area.to_string())]),
        };
        let first = Query::new("rust").narrowed(narrow("6001001000"));
        let second = Query::new("rust").narrowed(narrow("6001002000"));
        assert_eq!(first.label(), second.label());

        let state = CrawlState::new(10);
        assert_eq!(state.declare_total(&first, 1500), 1500);
        assert_eq!(state.declare_total(&second, 6000), 6000);
        assert_eq!(state.declared_total(&second), Some(6000));
    }

    #[test]
    fn test_snapshot_counts() {
        let state = CrawlState::new(10);
        state.record_request();
        state.record_request();
        state.record_page();
        state.record_probe();
        state.merge(vec![RawRecord::new("a", json!(null))], "root");
        state.merge(vec![RawRecord::new("a", json!(null))], "root");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.records, 1);
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.pages_fetched, 1);
        assert_eq!(snapshot.partitions_probed, 1);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::CapReached.to_string(), "cap reached");
        assert!(!StopReason::Exhausted.is_early());
        assert!(StopReason::Stalled.is_early());
    }
}
