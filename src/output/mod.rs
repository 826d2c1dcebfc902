//! Output module for crawl results
//!
//! This module renders crawl reports and writes collected records as JSON
//! lines. Persistence beyond that is left to callers.

mod report;

pub use report::{write_report, CrawlReport};

use crate::CrawlError;
use serde::Serialize;
use std::io::Write;

/// Writes one JSON document per line
///
/// # Returns
///
/// The number of lines written
pub fn write_json_lines<W, T>(items: &[T], out: &mut W) -> Result<usize, CrawlError>
where
    W: Write,
    T: Serialize,
{
    for item in items {
        serde_json::to_writer(&mut *out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(items.len())
}
