//! Site adapters
//!
//! A [`SiteAdapter`] knows how one remote search API wants its requests shaped
//! and how its responses are laid out. The crawler itself never looks inside a
//! record beyond the identifier the adapter extracts.

mod job104;
mod job1111;

pub use job104::Job104;
pub use job1111::Job1111;

use crate::config::SiteConfig;
use crate::query::Query;
use crate::CrawlError;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while decoding a page body
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// One raw record as served by the remote
#[derive(Debug, Clone, Serialize)]
pub struct RawRecord {
    /// Site-defined identifier; record identity is by this field alone
    pub id: String,

    /// Partition path that discovered the record
    pub label: String,

    /// Original payload, untouched
    pub payload: Value,
}

impl RawRecord {
    /// Creates a record that has not been attributed to a partition yet
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            payload,
        }
    }
}

/// Decoded content of one page
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    /// Total the remote reports for the query at this moment
    pub declared_total: u64,

    /// Records on this page; empty means there are no more pages
    pub records: Vec<RawRecord>,
}

impl PageResult {
    /// A page past the end of the result set
    pub fn exhausted() -> Self {
        Self::default()
    }
}

/// Request shaping and response decoding for one remote API
pub trait SiteAdapter: Send + Sync {
    /// Short platform name used in logs and normalized records
    fn name(&self) -> &'static str;

    /// Fixed parameters every query carries, including sort order
    fn default_params(&self, ascending: bool) -> BTreeMap<String, String>;

    /// Builds the request for one page of one query
    fn build_request(&self, client: &Client, query: &Query, page: u32) -> RequestBuilder;

    /// Decodes a 200 response body
    fn parse_page(&self, body: &str) -> Result<PageResult, ParseError>;
}

/// Maps a raw record to a caller-defined normalized shape
pub trait RecordTransform: Send + Sync {
    type Output;

    fn transform(&self, record: &RawRecord) -> Self::Output;
}

/// Normalized job posting shared by the built-in adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPosting {
    pub platform: String,
    pub name: String,
    pub company_name: String,
    pub salary: String,
    pub job_url: String,
    pub location: String,
    /// Partition path that discovered the posting
    pub source: String,
}

/// Salary text used when a posting states no figure
pub const NEGOTIABLE: &str = "Negotiable";

/// Built-in adapter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Job104,
    Job1111,
}

impl SiteKind {
    pub fn parse(kind: &str) -> Result<Self, CrawlError> {
        match kind.to_ascii_lowercase().as_str() {
            "job104" | "104" => Ok(Self::Job104),
            "job1111" | "1111" => Ok(Self::Job1111),
            other => Err(CrawlError::UnknownSite(other.to_string())),
        }
    }

    /// Instantiates the adapter for this kind
    pub fn adapter(&self, config: &SiteConfig) -> Arc<dyn SiteAdapter> {
        match self {
            Self::Job104 => Arc::new(Job104::new(config)),
            Self::Job1111 => Arc::new(Job1111::new(config)),
        }
    }

    /// The job posting transform matching this kind
    pub fn posting_transform(&self) -> Box<dyn RecordTransform<Output = JobPosting>> {
        match self {
            Self::Job104 => Box::new(job104::PostingTransform),
            Self::Job1111 => Box::new(job1111::PostingTransform),
        }
    }
}

/// Builds the adapter named by the site configuration
pub fn adapter_for(config: &SiteConfig) -> Result<Arc<dyn SiteAdapter>, CrawlError> {
    Ok(SiteKind::parse(&config.kind)?.adapter(config))
}

/// Reads a field that some APIs serve as a number and others as a string
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a scalar field as a string
fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turns a page's items into records, dropping any without an identifier
fn collect_records(
    site: &str,
    items: Option<&Value>,
    id_of: impl Fn(&Value) -> Option<String>,
) -> Vec<RawRecord> {
    let Some(items) = items.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match id_of(item) {
            Some(id) => Some(RawRecord::new(id, item.clone())),
            None => {
                tracing::debug!("[{}] dropping record without identifier", site);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_site_kind_parse() {
        assert_eq!(SiteKind::parse("job104").unwrap(), SiteKind::Job104);
        assert_eq!(SiteKind::parse("1111").unwrap(), SiteKind::Job1111);
        assert!(matches!(
            SiteKind::parse("indeed"),
            Err(CrawlError::UnknownSite(_))
        ));
    }

    #[test]
    fn test_lenient_fields() {
        assert_eq!(lenient_u64(&json!(42)), Some(42));
        assert_eq!(lenient_u64(&json!(" 42 ")), Some(42));
        assert_eq!(lenient_u64(&json!(null)), None);
        assert_eq!(lenient_string(&json!(7)), Some("7".to_string()));
        assert_eq!(lenient_string(&json!("")), None);
    }

    #[test]
    fn test_collect_records_drops_missing_ids() {
        let items = json!([{ "id": "a" }, { "name": "no id" }, { "id": 3 }]);
        let records = collect_records("test", Some(&items), |v| lenient_string(&v["id"]));
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "3"]);
        assert!(records.iter().all(|r| r.label.is_empty()));
    }

    #[test]
    fn test_collect_records_non_array() {
        assert!(collect_records("test", Some(&json!({})), |_| None).is_empty());
        assert!(collect_records("test", None, |_| None).is_empty());
    }
}
