//! Crawl report generation
//!
//! Summarizes one search for humans and for downstream tooling.

use crate::state::{CrawlSnapshot, StopReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};

/// Summary of one completed search
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    /// Adapter that served the search
    pub site: String,

    pub keyword: String,

    /// Records requested by the caller
    pub cap: usize,

    /// First declared total of the root query
    pub declared_total: u64,

    /// Distinct records returned
    pub records: usize,

    pub requests: u64,
    pub duplicates: u64,
    pub pages_fetched: u64,
    pub partitions_probed: u64,

    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlReport {
    /// Builds a report from the final crawl counters
    pub fn new(
        site: &str,
        keyword: &str,
        cap: usize,
        declared_total: u64,
        snapshot: CrawlSnapshot,
        stop_reason: StopReason,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            site: site.to_string(),
            keyword: keyword.to_string(),
            cap,
            declared_total,
            records: snapshot.records,
            requests: snapshot.requests,
            duplicates: snapshot.duplicates,
            pages_fetched: snapshot.pages_fetched,
            partitions_probed: snapshot.partitions_probed,
            stop_reason,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Share of the declared total that was collected, in percent
    pub fn coverage(&self) -> f64 {
        let reachable = self.declared_total.min(self.cap as u64);
        if reachable == 0 {
            return 100.0;
        }
        (self.records as f64 / reachable as f64) * 100.0
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Writes a report in a formatted manner
///
/// # Arguments
///
/// * `report` - The report to display
/// * `out` - Destination (stderr for the CLI, so stdout stays machine-readable)
pub fn write_report<W: Write>(report: &CrawlReport, out: &mut W) -> io::Result<()> {
    writeln!(out, "=== Crawl Report ===\n")?;

    writeln!(out, "Search:")?;
    writeln!(out, "  Site: {}", report.site)?;
    writeln!(out, "  Keyword: {}", report.keyword)?;
    writeln!(out, "  Requested records: {}", report.cap)?;
    writeln!(out, "  Declared total: {}", report.declared_total)?;
    writeln!(out)?;

    writeln!(out, "Activity:")?;
    writeln!(out, "  Requests issued: {}", report.requests)?;
    writeln!(out, "  Partitions probed: {}", report.partitions_probed)?;
    writeln!(out, "  Pages fetched: {}", report.pages_fetched)?;
    writeln!(out, "  Duplicates dropped: {}", report.duplicates)?;
    writeln!(out)?;

    writeln!(
        out,
        "Collected {} records ({:.1}% of reachable) in {:.1}s; stopped: {}",
        report.records,
        report.coverage(),
        report.elapsed_secs(),
        report.stop_reason
    )?;

    Ok(())
}
