//! Adapter for the 104 job bank search API

use crate::config::SiteConfig;
use crate::query::Query;
use crate::site::{
    collect_records, lenient_string, lenient_u64, JobPosting, PageResult, ParseError, RawRecord,
    RecordTransform, SiteAdapter, NEGOTIABLE,
};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::BTreeMap;

const SEARCH_PATH: &str = "/jobs/search/api/jobs";

/// Salary ceiling the API uses to mean "no upper bound"
const OPEN_ENDED_SALARY: u64 = 9_999_999;

/// Adapter for `www.104.com.tw`
#[derive(Debug, Clone)]
pub struct Job104 {
    endpoint: String,
    sort: Option<String>,
}

impl Job104 {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), SEARCH_PATH),
            sort: config.sort.clone(),
        }
    }

    /// Maps a sort key to the API's `order` code
    fn order_code(sort: Option<&str>) -> &'static str {
        match sort {
            Some("date") => "2",
            Some("experience") => "3",
            Some("education") => "4",
            Some("applicants") => "7",
            Some("salary") => "13",
            _ => "1",
        }
    }

    fn record_id(item: &Value) -> Option<String> {
        lenient_string(&item["jobNo"]).or_else(|| lenient_string(&item["link"]["job"]))
    }
}

impl SiteAdapter for Job104 {
    fn name(&self) -> &'static str {
        "104"
    }

    fn default_params(&self, ascending: bool) -> BTreeMap<String, String> {
        let order = Self::order_code(self.sort.as_deref());
        [
            ("ro", "0"),
            ("kwop", "7"),
            ("expansionType", "area,spec,com,job,wf,wktm"),
            ("mode", "s"),
            ("jobsource", "index_s"),
            ("order", order),
            ("asc", if ascending { "1" } else { "0" }),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn build_request(&self, client: &Client, query: &Query, page: u32) -> RequestBuilder {
        let page = page.to_string();
        let params = query.params();
        client
            .get(&self.endpoint)
            .query(&params)
            .query(&[("keyword", query.keyword()), ("page", page.as_str())])
    }

    fn parse_page(&self, body: &str) -> Result<PageResult, ParseError> {
        let data: Value = serde_json::from_str(body)?;

        let declared_total = data
            .get("metadata")
            .and_then(|m| m.get("pagination"))
            .and_then(|p| p.get("total"))
            .and_then(lenient_u64)
            .ok_or(ParseError::MissingField("metadata.pagination.total"))?;

        let records = collect_records(self.name(), data.get("data"), Self::record_id);

        Ok(PageResult {
            declared_total,
            records,
        })
    }
}

/// Normalizes 104 records into [`JobPosting`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PostingTransform;

impl RecordTransform for PostingTransform {
    type Output = JobPosting;

    fn transform(&self, record: &RawRecord) -> JobPosting {
        let job = &record.payload;
        let text = |key: &str| job[key].as_str().unwrap_or_default().to_string();

        let job_url = job["link"]["job"]
            .as_str()
            .filter(|link| !link.is_empty())
            .map(|link| format!("https:{}", link))
            .unwrap_or_default();

        let salary = match job["salaryDesc"].as_str().filter(|s| !s.is_empty()) {
            Some(desc) => desc.to_string(),
            None => {
                let low = lenient_u64(&job["salaryLow"]).unwrap_or(0);
                let high = lenient_u64(&job["salaryHigh"]).unwrap_or(0);
                if low > 0 && high > 0 && high < OPEN_ENDED_SALARY {
                    format!("{} - {}", low, high)
                } else if low > 0 {
                    format!("{} and up", low)
                } else {
                    NEGOTIABLE.to_string()
                }
            }
        };

        JobPosting {
            platform: "104".to_string(),
            name: text("jobName"),
            company_name: text("custName"),
            salary,
            job_url,
            location: format!("{} {}", text("jobAddrNoDesc"), text("jobAddress"))
                .trim()
                .to_string(),
            source: record.label.clone(),
        }
    }
}
