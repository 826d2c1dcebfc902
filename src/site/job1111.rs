//! Adapter for the 1111 job bank search API

use crate::config::SiteConfig;
use crate::query::Query;
use crate::site::{
    collect_records, lenient_string, lenient_u64, JobPosting, PageResult, ParseError, RawRecord,
    RecordTransform, SiteAdapter, NEGOTIABLE,
};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::BTreeMap;

const SEARCH_PATH: &str = "/api/v1/search/jobs/";

/// Adapter for `www.1111.com.tw`
#[derive(Debug, Clone)]
pub struct Job1111 {
    endpoint: String,
    sort: Option<String>,
}

impl Job1111 {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), SEARCH_PATH),
            sort: config.sort.clone(),
        }
    }

    fn record_id(item: &Value) -> Option<String> {
        lenient_string(&item["jobId"])
    }
}

impl SiteAdapter for Job1111 {
    fn name(&self) -> &'static str {
        "1111"
    }

    fn default_params(&self, ascending: bool) -> BTreeMap<String, String> {
        let sort_by = match self.sort.as_deref() {
            Some("date") => "da",
            _ => "ab",
        };
        [
            ("fromOffset", "0"),
            ("sortBy", sort_by),
            ("sortOrder", if ascending { "asc" } else { "desc" }),
            ("isSyncedRecommendJobs", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn build_request(&self, client: &Client, query: &Query, page: u32) -> RequestBuilder {
        let params = query.params();
        let sort_by = params.get("sortBy").map(String::as_str).unwrap_or("ab");
        let sort_order = params.get("sortOrder").map(String::as_str).unwrap_or("desc");
        let search_url = format!(
            "/search/job?page={}&col={}&sort={}&ks={}",
            page,
            sort_by,
            sort_order,
            query.keyword()
        );
        let page = page.to_string();

        client.get(&self.endpoint).query(&params).query(&[
            ("page", page.as_str()),
            ("keyword", query.keyword()),
            ("conditionsText", query.keyword()),
            ("searchUrl", search_url.as_str()),
        ])
    }

    fn parse_page(&self, body: &str) -> Result<PageResult, ParseError> {
        let data: Value = serde_json::from_str(body)?;
        let result = data.get("result").ok_or(ParseError::MissingField("result"))?;

        let declared_total = result
            .get("pagination")
            .and_then(|p| p.get("totalCount"))
            .and_then(lenient_u64)
            .ok_or(ParseError::MissingField("result.pagination.totalCount"))?;

        let records = collect_records(self.name(), result.get("hits"), Self::record_id);

        Ok(PageResult {
            declared_total,
            records,
        })
    }
}

/// Normalizes 1111 records into [`JobPosting`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PostingTransform;

impl RecordTransform for PostingTransform {
    type Output = JobPosting;

    fn transform(&self, record: &RawRecord) -> JobPosting {
        let job = &record.payload;
        let text = |key: &str| job[key].as_str().unwrap_or_default().to_string();

        let job_url = lenient_string(&job["jobId"])
            .map(|id| format!("https://www.1111.com.tw/job/{}/", id))
            .unwrap_or_default();

        JobPosting {
            platform: "1111".to_string(),
            name: text("title"),
            company_name: text("companyName"),
            salary: job["salary"]
                .as_str()
                .filter(|s| !s.is_empty())
                .unwrap_or(NEGOTIABLE)
                .to_string(),
            job_url,
            location: job["workCity"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            source: record.label.clone(),
        }
    }
}
