//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the search entry point and the scheduling loop that
//! coordinates one search:
//! - Seeding the queue with the root probe
//! - Executing probes and page fetches on the worker pool
//! - Feeding discovered tasks back into the queue
//! - Evaluating stop conditions and draining on cancellation

use crate::config::{validate, Config, CrawlerConfig, SiteConfig};
use crate::crawler::fetcher::{build_http_client, FetchError, PageFetcher};
use crate::crawler::monitor::{progress_event, run_monitor, LogProgress, ProgressSink};
use crate::crawler::planner::{PartitionPlanner, Plan};
use crate::crawler::scheduler::{Scheduler, Task, TaskOutcome};
use crate::output::CrawlReport;
use crate::query::{FacetLadder, Query};
use crate::site::{adapter_for, RawRecord, RecordTransform, SiteAdapter};
use crate::state::{CrawlState, StopReason};
use crate::CrawlError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Per-search options
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Extra request parameters applied to the root query
    pub overrides: BTreeMap<String, String>,

    /// Ask the remote for ascending order
    pub ascending: bool,
}

/// Result of one search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// First declared total of the root query
    pub declared_total: u64,

    /// Distinct records, never more than requested
    pub records: Vec<RawRecord>,

    pub report: CrawlReport,
}

impl SearchOutcome {
    /// Applies a record transform to every collected record
    pub fn transform<T>(&self, transform: &dyn RecordTransform<Output = T>) -> Vec<T> {
        self.records.iter().map(|r| transform.transform(r)).collect()
    }
}

/// Lifecycle phase of one search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Queue is being fed and drained
    Running,

    /// Cancelled; in-flight tasks finish but their children are dropped
    Draining,
}

/// Everything a task needs while it runs
struct TaskContext {
    fetcher: PageFetcher,
    planner: Arc<PartitionPlanner>,
    state: Arc<CrawlState>,
}

/// Public crawl facade
///
/// One `Crawler` can serve many searches; each search gets fresh state.
pub struct Crawler {
    config: Arc<CrawlerConfig>,
    site: Arc<dyn SiteAdapter>,
    site_params: BTreeMap<String, String>,
    client: reqwest::Client,
    planner: Arc<PartitionPlanner>,
    progress: Arc<dyn ProgressSink>,
}

impl Crawler {
    /// Creates a crawler using the adapter named in the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to search
    /// * `Err(CrawlError)` - Invalid configuration, unknown site kind or HTTP
    ///   client failure
    pub fn new(config: Config) -> Result<Self, CrawlError> {
        let site = adapter_for(&config.site)?;
        Self::with_adapter(config, site)
    }

    /// Creates a crawler around a caller-supplied site adapter
    ///
    /// The configuration is validated here as well, since callers may build
    /// it in code rather than through `load_config`.
    pub fn with_adapter(config: Config, site: Arc<dyn SiteAdapter>) -> Result<Self, CrawlError> {
        validate(&config)?;
        let client = build_http_client(&config.site, &config.crawler)?;
        let ladder = FacetLadder::from_config(&config.facets);
        let planner = PartitionPlanner::new(ladder, &config.crawler);
        let SiteConfig { params, .. } = config.site;

        Ok(Self {
            config: Arc::new(config.crawler),
            site,
            site_params: params,
            client,
            planner: Arc::new(planner),
            progress: Arc::new(LogProgress),
        })
    }

    /// Replaces the default logging progress sink
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Searches the remote for up to `max_records` distinct records
    ///
    /// Remote failures never surface as errors: rate limiting, blocks and
    /// stalls end the crawl early and the records gathered so far are
    /// returned.
    ///
    /// # Arguments
    ///
    /// * `keyword` - Search keyword, must not be blank
    /// * `max_records` - Cap on returned records; 0 returns immediately
    /// * `options` - Parameter overrides and ordering
    ///
    /// # Returns
    ///
    /// * `Ok(SearchOutcome)` - Declared total and deduplicated records
    /// * `Err(CrawlError::EmptyKeyword)` - Blank keyword, nothing was sent
    ///
    /// # Example
    ///
    /// ```no_run
    /// use facet_crawl::config::load_config;
    /// use facet_crawl::{Crawler, SearchOptions};
    /// use std::path::Path;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let crawler = Crawler::new(load_config(Path::new("crawl.toml"))?)?;
    /// let outcome = crawler.search("rust", 500, &SearchOptions::default()).await?;
    /// println!("{} of {} records", outcome.records.len(), outcome.declared_total);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn search(
        &self,
        keyword: &str,
        max_records: usize,
        options: &SearchOptions,
    ) -> Result<SearchOutcome, CrawlError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CrawlError::EmptyKeyword);
        }

        let started_at = Utc::now();
        let state = Arc::new(CrawlState::new(max_records));

        if max_records == 0 {
            tracing::debug!("Zero records requested for '{}', skipping crawl", keyword);
            return Ok(self.finish(keyword, state, 0, StopReason::CapReached, started_at));
        }

        let mut base = self.site.default_params(options.ascending);
        base.extend(self.site_params.clone());
        base.extend(options.overrides.clone());
        let root = Query::new(keyword).with_base_params(base);

        tracing::info!(
            "Searching [{}] '{}' for up to {} records ({} workers, page capacity {})",
            self.site.name(),
            keyword,
            max_records,
            self.config.workers,
            self.planner.threshold()
        );

        let ctx = Arc::new(TaskContext {
            fetcher: PageFetcher::new(
                self.client.clone(),
                Arc::clone(&self.site),
                Arc::clone(&self.config),
            ),
            planner: Arc::clone(&self.planner),
            state: Arc::clone(&state),
        });

        let started = Instant::now();
        let monitor = tokio::spawn(run_monitor(
            Arc::clone(&state),
            Arc::clone(&self.config),
            Arc::clone(&self.progress),
            keyword.to_string(),
        ));

        let mut coordinator = Coordinator::new(ctx, self.config.workers as usize);
        let reason = coordinator.run(root.clone()).await;
        drop(coordinator);

        monitor.abort();
        if let Err(e) = monitor.await {
            if e.is_panic() {
                tracing::error!("Crawl monitor failed: {}", e);
            }
        }
        self.progress
            .on_progress(&progress_event(&state, keyword, started));

        let declared_total = state.declared_total(&root).unwrap_or(0);
        Ok(self.finish(keyword, state, declared_total, reason, started_at))
    }

    fn finish(
        &self,
        keyword: &str,
        state: Arc<CrawlState>,
        declared_total: u64,
        reason: StopReason,
        started_at: chrono::DateTime<Utc>,
    ) -> SearchOutcome {
        let report = CrawlReport::new(
            self.site.name(),
            keyword,
            state.store().cap(),
            declared_total,
            state.snapshot(),
            reason,
            started_at,
        );

        let records = match Arc::try_unwrap(state) {
            Ok(state) => state.into_records(),
            Err(shared) => shared.store().snapshot(),
        };

        tracing::info!(
            "Search '{}' finished: {} records of {} declared, {} requests, stopped: {}",
            keyword,
            records.len(),
            declared_total,
            report.requests,
            reason
        );

        SearchOutcome {
            declared_total,
            records,
            report,
        }
    }
}

/// Drives the task queue of one search to completion
struct Coordinator {
    ctx: Arc<TaskContext>,
    scheduler: Scheduler,
    phase: Phase,
}

impl Coordinator {
    fn new(ctx: Arc<TaskContext>, workers: usize) -> Self {
        Self {
            ctx,
            scheduler: Scheduler::new(workers),
            phase: Phase::Running,
        }
    }

    /// Runs until the queue drains or a stop condition drains it
    ///
    /// Stop conditions, checked after every completed task:
    /// 1. The store reached the requested cap
    /// 2. A task reported a hard block
    /// 3. The monitor cancelled the crawl (stall)
    async fn run(&mut self, root: Query) -> StopReason {
        let state = Arc::clone(&self.ctx.state);
        self.scheduler.submit(Task::probe(root, 0));

        loop {
            if self.phase == Phase::Running {
                let ctx = Arc::clone(&self.ctx);
                self.scheduler
                    .fill(|task| execute(Arc::clone(&ctx), task));
            }

            let Some(outcome) = self.scheduler.next_completed().await else {
                break;
            };

            if outcome.hard_block {
                state.stop(StopReason::HardBlock);
            }
            if state.store().is_full() {
                state.stop(StopReason::CapReached);
            }

            if self.phase == Phase::Running && state.is_cancelled() {
                self.phase = Phase::Draining;
                let dropped = self.scheduler.clear_pending();
                tracing::info!(
                    "Draining: {} tasks in flight, {} queued tasks dropped",
                    self.scheduler.in_flight(),
                    dropped
                );
            }

            match self.phase {
                Phase::Running => self.scheduler.submit_all(outcome.children),
                Phase::Draining if !outcome.children.is_empty() => {
                    tracing::debug!("Discarding {} child tasks", outcome.children.len());
                }
                Phase::Draining => {}
            }
        }

        state.stop_reason().unwrap_or(StopReason::Exhausted)
    }
}

/// Executes one task; cancellation is checked before any work starts
async fn execute(ctx: Arc<TaskContext>, task: Task) -> TaskOutcome {
    if ctx.state.is_cancelled() {
        return TaskOutcome::default();
    }

    match task {
        Task::Probe { query, level } => probe(&ctx, query, level).await,
        Task::FetchPage { query, page, label } => fetch_page(&ctx, &query, page, &label).await,
    }
}

/// Fetches page 1 of a query and plans what follows
async fn probe(ctx: &TaskContext, query: Query, level: usize) -> TaskOutcome {
    ctx.state.record_probe();

    let page = match ctx.fetcher.fetch(&query, 1, &ctx.state).await {
        Ok(page) => page,
        Err(e) => return failed(&query, 1, e),
    };
    ctx.state.record_page();

    let total = ctx.state.declare_total(&query, page.declared_total);
    let label = query.label();
    let empty = page.records.is_empty();
    let added = ctx.state.merge(page.records, &label);

    if empty || total == 0 {
        tracing::debug!("{}: no results", query);
        return TaskOutcome {
            added,
            ..TaskOutcome::default()
        };
    }

    // Budget as it stood before this probe's own page was merged
    let remaining = ctx.state.store().remaining() + added;
    let children = match ctx.planner.plan(&query, total, level, remaining) {
        Plan::Paginate { pages } => {
            tracing::debug!("{}: {} results, paginating {} pages", query, total, pages);
            (2..=pages)
                .map(|page| Task::fetch_page(query.clone(), page))
                .collect()
        }
        Plan::Split { level, children } => children
            .into_iter()
            .map(|child| Task::probe(child, level))
            .collect(),
    };

    TaskOutcome {
        children,
        added,
        hard_block: false,
    }
}

/// Fetches one further page of a probed query
async fn fetch_page(ctx: &TaskContext, query: &Query, page: u32, label: &str) -> TaskOutcome {
    let result = match ctx.fetcher.fetch(query, page, &ctx.state).await {
        Ok(result) => result,
        Err(e) => return failed(query, page, e),
    };
    ctx.state.record_page();

    let added = ctx.state.merge(result.records, label);
    tracing::trace!("{} page {}: {} new records", label, page, added);

    TaskOutcome {
        added,
        ..TaskOutcome::default()
    }
}

fn failed(query: &Query, page: u32, error: FetchError) -> TaskOutcome {
    match error {
        FetchError::HardBlock { .. } => {
            tracing::error!("{} page {}: {}", query, page, error);
            TaskOutcome::hard_block()
        }
        FetchError::Unavailable { .. } => {
            tracing::warn!("Skipping {} page {}: {}", query, page, error);
            TaskOutcome::default()
        }
        FetchError::Cancelled => TaskOutcome::default(),
    }
}
