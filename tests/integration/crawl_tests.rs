//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up a fake search index and exercise the
//! full search cycle end-to-end: probing, splitting, paging, deduplication
//! and the early-stop paths.

use facet_crawl::config::{Config, CrawlerConfig, FacetConfig, FacetValueConfig, SiteConfig};
use facet_crawl::crawler::{Crawler, ProgressEvent, ProgressSink};
use facet_crawl::site::SiteKind;
use facet_crawl::{SearchOptions, StopReason};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const SEARCH_PATH: &str = "/jobs/search/api/jobs";
const AREAS: [&str; 4] = ["6001001000", "6001002000", "6001003000", "6001004000"];

/// Fake search index serving the 104 response layout
///
/// Record `i` lives in area `i % 4`; with `overlap_every` set, every such
/// record is also listed under the following area.
struct FakeIndex {
    total: usize,
    page_size: usize,
    max_pages: u32,
    overlap_every: Option<usize>,
    forbidden_page: Option<u32>,
}

impl FakeIndex {
    fn new(total: usize) -> Self {
        Self {
            total,
            page_size: 20,
            max_pages: 150,
            overlap_every: None,
            forbidden_page: None,
        }
    }

    fn in_area(&self, index: usize, area: &str) -> bool {
        let primary = AREAS[index % AREAS.len()];
        let listed_twice = self.overlap_every.is_some_and(|n| index % n == 0);
        let secondary = AREAS[(index + 1) % AREAS.len()];
        primary == area || (listed_twice && secondary == area)
    }
}

impl Respond for FakeIndex {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let page: u32 = params
            .get("page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);

        if self.forbidden_page == Some(page) {
            return ResponseTemplate::new(403);
        }
        if page == 0 || page > self.max_pages {
            return ResponseTemplate::new(400);
        }

        let matching: Vec<usize> = (0..self.total)
            .filter(|&i| match params.get("area") {
                Some(area) => self.in_area(i, area),
                None => true,
            })
            .collect();

        let start = (page as usize - 1) * self.page_size;
        let data: Vec<_> = matching
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|i| {
                json!({
                    "jobNo": format!("job-{}", i),
                    "jobName": format!("Rust Engineer {}", i),
                    "custName": "Ferris Ltd",
                    "link": { "job": format!("//www.104.com.tw/job/{}", i) },
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "data": data,
            "metadata": { "pagination": { "total": matching.len(), "currentPage": page } },
        }))
    }
}

/// Creates a fast test configuration pointed at the mock server
fn create_test_config(base_url: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 4,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            retry_backoff_ms: 10,
            rate_limit_cooldown_ms: 10,
            request_timeout_ms: 5_000,
            stall_interval_ms: 60_000,
            progress_interval_ms: 60_000,
            ..CrawlerConfig::default()
        },
        site: SiteConfig {
            kind: "job104".to_string(),
            base_url: base_url.to_string(),
            user_agent: "TestAgent/1.0".to_string(),
            referer: None,
            sort: None,
            params: BTreeMap::new(),
        },
        facets: vec![FacetConfig {
            name: "region".to_string(),
            refines: None,
            values: AREAS
                .iter()
                .map(|area| FacetValueConfig {
                    label: format!("area-{}", area),
                    params: BTreeMap::from([("area".to_string(), area.to_string())]),
                    high_density: false,
                    children: vec![],
                })
                .collect(),
        }],
    }
}

async fn mount(server: &MockServer, responder: impl Respond + 'static) {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(responder)
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .expect("Request recording is enabled")
        .len()
}

fn distinct_ids(records: &[facet_crawl::RawRecord]) -> HashSet<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[derive(Default)]
struct CollectProgress(Mutex<Vec<ProgressEvent>>);

impl ProgressSink for CollectProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn test_small_search_paginates_without_split() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, FakeIndex::new(30)).await;

    let progress = Arc::new(CollectProgress::default());
    let crawler = Crawler::new(create_test_config(&mock_server.uri()))
        .expect("Failed to build crawler")
        .with_progress(progress.clone());

    let outcome = crawler
        .search("rust", 50, &SearchOptions::default())
        .await
        .expect("Search failed");

    assert_eq!(outcome.declared_total, 30);
    assert_eq!(outcome.records.len(), 30);
    assert_eq!(distinct_ids(&outcome.records).len(), 30);
    assert_eq!(outcome.report.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.report.partitions_probed, 1);

    // Probe (page 1) plus page 2
    assert_eq!(request_count(&mock_server).await, 2);

    // The final progress event always fires
    let events = progress.0.lock().unwrap();
    let last = events.last().expect("Expected a progress event");
    assert_eq!(last.snapshot.records, 30);
}

#[tokio::test]
async fn test_large_search_splits_by_region() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, FakeIndex::new(6000)).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let outcome = crawler
        .search("rust", 10_000, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.declared_total, 6000);
    assert_eq!(outcome.records.len(), 6000);
    assert_eq!(distinct_ids(&outcome.records).len(), 6000);
    assert_eq!(outcome.report.stop_reason, StopReason::Exhausted);

    // Root plus one probe per region
    assert_eq!(outcome.report.partitions_probed, 5);

    // Records keep the label of the partition that found them first
    let from_root = outcome.records.iter().filter(|r| r.label == "rust").count();
    assert_eq!(from_root, 20);
    assert!(outcome
        .records
        .iter()
        .filter(|r| r.label != "rust")
        .all(|r| r.label.starts_with("rust/region=area-")));
}

#[tokio::test]
async fn test_overlapping_partitions_are_deduplicated() {
    let mock_server = MockServer::start().await;
    let mut index = FakeIndex::new(4000);
    index.overlap_every = Some(10);
    mount(&mock_server, index).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let outcome = crawler
        .search("rust", 10_000, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.declared_total, 4000);
    assert_eq!(outcome.records.len(), 4000);
    assert_eq!(distinct_ids(&outcome.records).len(), 4000);
    assert!(outcome.report.duplicates >= 400);
}

#[tokio::test]
async fn test_persistent_rate_limit_returns_empty() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, ResponseTemplate::new(429)).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let outcome = crawler
        .search("rust", 100, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.declared_total, 0);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.stop_reason, StopReason::HardBlock);

    // One attempt per unit of retry budget, then nothing else
    assert_eq!(request_count(&mock_server).await, 3);
}

#[tokio::test]
async fn test_zero_max_records_sends_nothing() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, FakeIndex::new(30)).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let outcome = crawler
        .search("rust", 0, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.declared_total, 0);
    assert!(outcome.records.is_empty());
    assert_eq!(request_count(&mock_server).await, 0);
}

#[tokio::test]
async fn test_cap_bounds_records_and_requests() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, FakeIndex::new(6000)).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let outcome = crawler
        .search("rust", 50, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.declared_total, 6000);
    assert_eq!(outcome.records.len(), 50);
    assert_eq!(outcome.report.stop_reason, StopReason::CapReached);

    // Root, four region probes and at most a handful of in-flight pages
    assert!(request_count(&mock_server).await <= 12);
}

#[tokio::test]
async fn test_hard_block_returns_partial_results() {
    let mock_server = MockServer::start().await;
    let mut index = FakeIndex::new(100);
    index.forbidden_page = Some(3);
    mount(&mock_server, index).await;

    let mut config = create_test_config(&mock_server.uri());
    config.crawler.workers = 1;

    let crawler = Crawler::new(config).unwrap();
    let outcome = crawler
        .search("rust", 1000, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.declared_total, 100);
    assert_eq!(outcome.records.len(), 40);
    assert_eq!(outcome.report.stop_reason, StopReason::HardBlock);

    // Pages 4 and 5 were never requested
    assert_eq!(request_count(&mock_server).await, 3);
}

#[tokio::test]
async fn test_stalled_crawl_is_aborted() {
    let mock_server = MockServer::start().await;

    // Declares plenty of results but keeps serving the same page
    let frozen = |_: &Request| {
        let data: Vec<_> = (0..20)
            .map(|i| json!({ "jobNo": format!("job-{}", i) }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "data": data,
            "metadata": { "pagination": { "total": 2000 } },
        }))
    };
    mount(&mock_server, frozen).await;

    let mut config = create_test_config(&mock_server.uri());
    config.crawler.workers = 2;
    config.crawler.jitter_min_ms = 20;
    config.crawler.jitter_max_ms = 30;
    config.crawler.stall_interval_ms = 100;
    config.crawler.stall_min_requests = 3;
    config.crawler.stall_samples = 1;

    let crawler = Crawler::new(config).unwrap();
    let outcome = crawler
        .search("rust", 1000, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.report.stop_reason, StopReason::Stalled);
    assert_eq!(outcome.records.len(), 20);
    assert!(outcome.report.duplicates > 0);

    // Aborted well before all 50 pages were fetched
    assert!(request_count(&mock_server).await < 50);
}

#[tokio::test]
async fn test_overrides_reach_the_wire() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, FakeIndex::new(6000)).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let options = SearchOptions {
        overrides: BTreeMap::from([("area".to_string(), AREAS[0].to_string())]),
        ascending: true,
    };
    let outcome = crawler.search("rust", 40, &options).await.unwrap();

    assert_eq!(outcome.declared_total, 1500);
    assert_eq!(outcome.records.len(), 40);

    let requests = mock_server.received_requests().await.unwrap();
    let first: HashMap<String, String> = requests[0].url.query_pairs().into_owned().collect();
    assert_eq!(first.get("area").map(String::as_str), Some(AREAS[0]));
    assert_eq!(first.get("asc").map(String::as_str), Some("1"));
    assert_eq!(first.get("keyword").map(String::as_str), Some("rust"));
}

#[tokio::test]
async fn test_records_normalize_to_postings() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, FakeIndex::new(5)).await;

    let crawler = Crawler::new(create_test_config(&mock_server.uri())).unwrap();
    let outcome = crawler
        .search("rust", 10, &SearchOptions::default())
        .await
        .unwrap();

    let postings = outcome.transform(SiteKind::Job104.posting_transform().as_ref());
    assert_eq!(postings.len(), 5);
    assert!(postings.iter().all(|p| p.platform == "104"));
    assert!(postings.iter().all(|p| p.company_name == "Ferris Ltd"));
    assert!(postings
        .iter()
        .any(|p| p.job_url == "https://www.104.com.tw/job/0"));
}
