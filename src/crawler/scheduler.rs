//! Task queue and bounded worker pool
//!
//! Tasks are plain data. The coordinator owns the queue; workers run on a
//! `JoinSet` and hand their child tasks back through their outcome, so the
//! queue has a single writer and no task is ever lost between producers.

use crate::query::Query;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use tokio::task::JoinSet;

/// A unit of crawl work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Fetch page 1 of a query, then paginate or split it
    Probe { query: Query, level: usize },

    /// Fetch one further page of an already probed query
    FetchPage {
        query: Query,
        page: u32,
        /// Partition path attached to the page's records
        label: String,
    },
}

impl Task {
    pub fn probe(query: Query, level: usize) -> Self {
        Self::Probe { query, level }
    }

    pub fn fetch_page(query: Query, page: u32) -> Self {
        let label = query.label();
        Self::FetchPage { query, page, label }
    }

    pub fn query(&self) -> &Query {
        match self {
            Self::Probe { query, .. } | Self::FetchPage { query, .. } => query,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe { query, level } => write!(f, "probe {} (level {})", query, level),
            Self::FetchPage { label, page, .. } => write!(f, "fetch {} page {}", label, page),
        }
    }
}

/// What a finished task reports back to the coordinator
#[derive(Debug, Default)]
pub struct TaskOutcome {
    /// Tasks discovered by this one
    pub children: Vec<Task>,

    /// Distinct records this task added
    pub added: usize,

    /// The remote hard-blocked this task
    pub hard_block: bool,
}

impl TaskOutcome {
    pub fn hard_block() -> Self {
        Self {
            hard_block: true,
            ..Self::default()
        }
    }
}

/// Pending task queue plus the set of in-flight workers
pub struct Scheduler {
    queue: VecDeque<Task>,
    running: JoinSet<TaskOutcome>,
    capacity: usize,
}

impl Scheduler {
    /// Creates a scheduler running at most `capacity` tasks at once
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            running: JoinSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn submit(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    pub fn submit_all(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.queue.extend(tasks);
    }

    /// Starts queued tasks until every worker slot is busy
    ///
    /// # Returns
    ///
    /// The number of tasks started
    pub fn fill<F, Fut>(&mut self, mut run: F) -> usize
    where
        F: FnMut(Task) -> Fut,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let mut started = 0;
        while self.running.len() < self.capacity {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            tracing::trace!("Starting {}", task);
            self.running.spawn(run(task));
            started += 1;
        }
        started
    }

    /// Waits for the next in-flight task to finish
    ///
    /// Returns `None` once nothing is running. A worker that panicked is
    /// reported as an empty outcome.
    pub async fn next_completed(&mut self) -> Option<TaskOutcome> {
        match self.running.join_next().await? {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!("Crawl task failed: {}", e);
                Some(TaskOutcome::default())
            }
        }
    }

    /// Drops every queued task that has not started
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.running.len()
    }
}
