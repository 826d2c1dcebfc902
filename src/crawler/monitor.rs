//! Stall/abort monitor and progress reporting
//!
//! Samples the crawl at fixed intervals. A crawl that keeps issuing requests
//! without adding distinct records is cancelled; every crawl gets periodic
//! progress events.

use crate::config::CrawlerConfig;
use crate::state::{CrawlSnapshot, CrawlState, StopReason};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, MissedTickBehavior};

/// Advisory progress event
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub keyword: String,
    pub cap: usize,
    pub snapshot: CrawlSnapshot,
    pub elapsed: Duration,
    /// Time since the record count last grew
    pub idle: Duration,
}

/// Receiver for progress events
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Default sink: logs each event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let rate = event.snapshot.records as f64 / event.elapsed.as_secs_f64().max(0.001);
        tracing::info!(
            "Progress [{}]: {}/{} records, {} requests, {} duplicates, {} partitions, {:.2} records/sec",
            event.keyword,
            event.snapshot.records,
            event.cap,
            event.snapshot.requests,
            event.snapshot.duplicates,
            event.snapshot.partitions_probed,
            rate
        );
    }
}

/// Stall detection over successive samples
#[derive(Debug, Clone)]
pub struct StallDetector {
    min_requests: u64,
    samples_needed: u32,
    last: Option<CrawlSnapshot>,
    stagnant: u32,
}

impl StallDetector {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            min_requests: config.stall_min_requests,
            samples_needed: config.stall_samples.max(1),
            last: None,
            stagnant: 0,
        }
    }

    /// Feeds one sample; returns true once the crawl counts as stalled
    ///
    /// A sample is stagnant when requests were issued since the previous one
    /// but the record count did not grow. Samples taken before the request
    /// floor is crossed never count.
    pub fn observe(&mut self, snapshot: &CrawlSnapshot) -> bool {
        let stagnant = self.last.is_some_and(|prev| {
            snapshot.records <= prev.records && snapshot.requests > prev.requests
        });
        self.last = Some(*snapshot);

        if stagnant && snapshot.requests > self.min_requests {
            self.stagnant += 1;
        } else {
            self.stagnant = 0;
        }

        self.stagnant >= self.samples_needed
    }
}

/// Runs until the crawl is cancelled or the task is aborted
pub async fn run_monitor(
    state: Arc<CrawlState>,
    config: Arc<CrawlerConfig>,
    sink: Arc<dyn ProgressSink>,
    keyword: String,
) {
    let started = Instant::now();
    let mut detector = StallDetector::new(&config);

    let stall_period = config.stall_interval();
    let progress_period = config.progress_interval();
    let now = tokio::time::Instant::now();
    let mut stall_tick = interval_at(now + stall_period, stall_period);
    let mut progress_tick = interval_at(now + progress_period, progress_period);
    stall_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    progress_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = state.cancel_token().cancelled() => break,
            _ = stall_tick.tick() => {
                let snapshot = state.snapshot();
                if detector.observe(&snapshot) {
                    tracing::warn!(
                        "No new records for {:?} despite {} requests; aborting crawl",
                        state.idle_for(),
                        snapshot.requests
                    );
                    state.stop(StopReason::Stalled);
                }
            }
            _ = progress_tick.tick() => {
                sink.on_progress(&progress_event(&state, &keyword, started));
            }
        }
    }
}

/// Builds a progress event from the current state
pub fn progress_event(state: &CrawlState, keyword: &str, started: Instant) -> ProgressEvent {
    ProgressEvent {
        keyword: keyword.to_string(),
        cap: state.store().cap(),
        snapshot: state.snapshot(),
        elapsed: started.elapsed(),
        idle: state.idle_for(),
    }
}
