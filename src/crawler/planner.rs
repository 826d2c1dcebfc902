//! Partition planner
//!
//! Decides, from a query's first declared total, whether to page through it
//! directly or split it along the next applicable facet level.

use crate::config::CrawlerConfig;
use crate::query::{FacetLadder, Query};

/// What to do with a probed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Fetch pages `1..=pages` of the query itself
    Paginate { pages: u32 },

    /// Probe each child; `level` is the ladder index the children continue from
    Split { level: usize, children: Vec<Query> },
}

/// Partition planner over a fixed facet ladder
#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    ladder: FacetLadder,
    page_size: u32,
    max_pages: u32,
}

impl PartitionPlanner {
    pub fn new(ladder: FacetLadder, config: &CrawlerConfig) -> Self {
        Self {
            ladder,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        }
    }

    /// Largest declared total that pagination alone can exhaust
    pub fn threshold(&self) -> u64 {
        u64::from(self.max_pages) * u64::from(self.page_size)
    }

    pub fn ladder(&self) -> &FacetLadder {
        &self.ladder
    }

    /// Plans a probed query
    ///
    /// # Arguments
    ///
    /// * `query` - The probed query
    /// * `declared_total` - The query's first declared total
    /// * `level` - First ladder index not yet applied to this query
    /// * `remaining` - Records still wanted before the cap is reached
    pub fn plan(&self, query: &Query, declared_total: u64, level: usize, remaining: usize) -> Plan {
        if declared_total > self.threshold() {
            if let Some((index, children)) = self.ladder.next_split(query, level) {
                tracing::debug!(
                    "{}: {} results exceed {}, splitting on '{}' into {} partitions",
                    query,
                    declared_total,
                    self.threshold(),
                    self.ladder.levels()[index].name(),
                    children.len()
                );
                return Plan::Split {
                    level: index + 1,
                    children,
                };
            }

            tracing::warn!(
                "{}: {} results exceed {} and no facet level remains; only the first {} are reachable",
                query,
                declared_total,
                self.threshold(),
                self.threshold()
            );
        }

        Plan::Paginate {
            pages: self.page_count(declared_total.min(remaining as u64)),
        }
    }

    /// Pages needed to read `reachable` records, capped at the page ceiling
    fn page_count(&self, reachable: u64) -> u32 {
        let pages = reachable.div_ceil(u64::from(self.page_size));
        pages.min(u64::from(self.max_pages)) as u32
    }
}
