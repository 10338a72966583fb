//! Integration tests for the spider
//!
//! These tests use wiremock to serve paginated listings and drive the real
//! HTTP fetch client, selector parser and SQLite storage end-to-end.

use async_trait::async_trait;
use listing_spider::config::{
    Config, OutputConfig, ParserConfig, SpiderConfig, UserAgentConfig,
};
use listing_spider::crawler::{
    crawl_pages, run_crawl, FetchClient, FetchError, HttpFetchClient, SelectorParser, Spider,
    StopReason,
};
use listing_spider::state::PageStatus;
use listing_spider::storage::{JobStore, PageRecordStore, SqliteStorage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn parser_config() -> ParserConfig {
    ParserConfig {
        item_selector: "li.item".to_string(),
        next_selector: "a.next".to_string(),
        fields: [("id".to_string(), "span.id".to_string())]
            .into_iter()
            .collect(),
    }
}

fn create_test_config(db_path: &str) -> Config {
    Config {
        spider: SpiderConfig {
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
            max_pages: None,
            max_concurrent_spiders: 2,
            page_delay_ms: 0,
        },
        user_agent: user_agent(),
        output: OutputConfig {
            database_path: db_path.to_string(),
            snapshot_dir: None,
        },
        parser: parser_config(),
    }
}

/// Renders a listing page with the given record ids and optional next link
fn listing(ids: &[&str], next: Option<&str>) -> String {
    let items: String = ids
        .iter()
        .map(|id| format!(r#"<li class="item"><span class="id">{}</span></li>"#, id))
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();
    format!("<html><body><ul>{}</ul>{}</body></html>", items, next)
}

async fn mount_page(server: &MockServer, route: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

fn http_spider(storage: &Arc<SqliteStorage>) -> Spider<HttpFetchClient, SelectorParser> {
    Spider::new(
        HttpFetchClient::new(&user_agent(), &SpiderConfig::default()).unwrap(),
        SelectorParser::new(&parser_config()).unwrap(),
        storage.clone(),
        storage.clone(),
    )
}

fn record_ids(jobs: &[listing_spider::storage::JobRecord]) -> Vec<String> {
    jobs.iter()
        .flat_map(|job| job.records.iter())
        .filter_map(|record| record.get("id").map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_two_page_listing() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing(&["a", "b"], Some("/list/2")), 1).await;
    mount_page(&server, "/list/2", listing(&["c"], None), 1).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list", server.uri()), 1)
        .await
        .unwrap();

    let mut spider = http_spider(&storage);
    spider.bind(record.clone());
    let report = spider.run().await.unwrap();

    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.pages_saved, 2);

    let jobs = storage.jobs_for_page(record.id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].page_number, 1);
    assert_eq!(jobs[1].page_number, 2);
    assert_eq!(jobs[1].page_url, format!("{}/list/2", server.uri()));
    assert_eq!(record_ids(&jobs), vec!["a", "b", "c"]);
    for job in &jobs {
        let started = chrono::DateTime::parse_from_rfc3339(&job.started_at).unwrap();
        let finished = chrono::DateTime::parse_from_rfc3339(&job.finished_at).unwrap();
        assert!(finished >= started);
    }

    assert_eq!(
        storage.get_page(record.id).await.unwrap().status,
        PageStatus::Waiting
    );
}

#[tokio::test]
async fn test_fetch_failure_on_second_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing(&["a", "b"], Some("/list/2")), 1).await;
    Mock::given(method("GET"))
        .and(path("/list/2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list", server.uri()), 1)
        .await
        .unwrap();

    let mut spider = http_spider(&storage);
    spider.bind(record.clone());
    let report = spider.run().await.unwrap();

    match &report.stop {
        StopReason::Failed {
            page_number, error, ..
        } => {
            assert_eq!(*page_number, 2);
            assert!(error.contains("HTTP 500"), "unexpected error: {}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let jobs = storage.jobs_for_page(record.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].page_number, 1);
    assert_eq!(record_ids(&jobs), vec!["a", "b"]);
    assert_eq!(
        storage.get_page(record.id).await.unwrap().status,
        PageStatus::Waiting
    );
}

#[tokio::test]
async fn test_fetch_failure_on_first_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list", server.uri()), 1)
        .await
        .unwrap();

    let mut spider = http_spider(&storage);
    spider.bind(record.clone());
    let report = spider.run().await.unwrap();

    assert_eq!(report.pages_saved, 0);
    assert!(matches!(
        report.stop,
        StopReason::Failed { page_number: 1, .. }
    ));
    assert!(storage.jobs_for_page(record.id).await.unwrap().is_empty());
    assert_eq!(
        storage.get_page(record.id).await.unwrap().status,
        PageStatus::Waiting
    );
}

#[tokio::test]
async fn test_non_html_response_fails_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", "upstream says no".to_string(), 1).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list", server.uri()), 1)
        .await
        .unwrap();

    let mut spider = http_spider(&storage);
    spider.bind(record.clone());
    let report = spider.run().await.unwrap();

    match &report.stop {
        StopReason::Failed { error, .. } => {
            assert!(error.contains("no document body"), "unexpected error: {}", error)
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(storage.jobs_for_page(record.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pagination_end_stops_fetching() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing(&["a"], Some("/list/2")), 1).await;
    mount_page(&server, "/list/2", listing(&["b"], Some("/list/3")), 1).await;
    mount_page(&server, "/list/3", listing(&["c"], None), 1).await;
    // Never linked to; must not be requested
    mount_page(&server, "/list/4", listing(&["d"], None), 0).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list", server.uri()), 1)
        .await
        .unwrap();

    let mut spider = http_spider(&storage);
    spider.bind(record.clone());
    let report = spider.run().await.unwrap();

    assert_eq!(report.pages_saved, 3);
    assert_eq!(report.records_saved, 3);
    assert_eq!(storage.jobs_for_page(record.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_record_starts_at_its_page_number() {
    let server = MockServer::start().await;
    mount_page(&server, "/list/7", listing(&["x"], Some("/list/8")), 1).await;
    mount_page(&server, "/list/8", listing(&["y"], None), 1).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list/7", server.uri()), 7)
        .await
        .unwrap();

    let mut spider = http_spider(&storage);
    spider.bind(record.clone());
    spider.run().await.unwrap();

    let numbers: Vec<u32> = storage
        .jobs_for_page(record.id)
        .await
        .unwrap()
        .iter()
        .map(|job| job.page_number)
        .collect();
    assert_eq!(numbers, vec![7, 8]);
}

/// Wraps a fetch client and records the page record's status at every fetch
struct StatusWatcher {
    inner: HttpFetchClient,
    storage: Arc<SqliteStorage>,
    page_id: i64,
    seen: Mutex<Vec<PageStatus>>,
}

#[async_trait]
impl FetchClient for StatusWatcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let status = self.storage.get_page(self.page_id).await.unwrap().status;
        self.seen.lock().unwrap().push(status);
        self.inner.fetch(url).await
    }
}

#[tokio::test]
async fn test_record_is_processing_while_pages_are_fetched() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing(&["a"], Some("/list/2")), 1).await;
    mount_page(&server, "/list/2", listing(&["b"], None), 1).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let record = storage
        .create_page(&format!("{}/list", server.uri()), 1)
        .await
        .unwrap();

    let watcher = Arc::new(StatusWatcher {
        inner: HttpFetchClient::new(&user_agent(), &SpiderConfig::default()).unwrap(),
        storage: storage.clone(),
        page_id: record.id,
        seen: Mutex::new(Vec::new()),
    });
    let mut spider = Spider::new(
        Arc::clone(&watcher),
        SelectorParser::new(&parser_config()).unwrap(),
        storage.clone(),
        storage.clone(),
    );
    spider.bind(record.clone());
    spider.run().await.unwrap();

    assert_eq!(
        *watcher.seen.lock().unwrap(),
        vec![PageStatus::Processing, PageStatus::Processing]
    );
    assert_eq!(
        storage.get_page(record.id).await.unwrap().status,
        PageStatus::Waiting
    );
}

#[tokio::test]
async fn test_crawl_pages_runs_each_record_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/shop-a", listing(&["a1"], Some("/shop-a/2")), 1).await;
    mount_page(&server, "/shop-a/2", listing(&["a2"], None), 1).await;
    mount_page(&server, "/shop-b", listing(&["b1", "b2"], None), 1).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let a = storage
        .create_page(&format!("{}/shop-a", server.uri()), 1)
        .await
        .unwrap();
    let b = storage
        .create_page(&format!("{}/shop-b", server.uri()), 1)
        .await
        .unwrap();

    let settings = SpiderConfig {
        max_concurrent_spiders: 2,
        ..SpiderConfig::default()
    };
    let reports = crawl_pages(
        vec![a.clone(), b.clone(), a.clone()],
        Arc::new(HttpFetchClient::new(&user_agent(), &settings).unwrap()),
        SelectorParser::new(&parser_config()).unwrap(),
        storage.clone(),
        storage.clone(),
        &settings,
    )
    .await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].page_id, a.id);
    assert_eq!(reports[0].pages_saved, 2);
    assert_eq!(reports[1].page_id, b.id);
    assert_eq!(reports[1].records_saved, 2);
    assert!(reports.iter().all(|report| report.is_complete()));

    let waiting = storage
        .list_pages_by_status(PageStatus::Waiting)
        .await
        .unwrap();
    assert_eq!(waiting.len(), 2);
}

#[tokio::test]
async fn test_run_crawl_from_config() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing(&["a", "b"], Some("/list/2")), 1).await;
    mount_page(&server, "/list/2", listing(&["c"], None), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("spider.db");
    let config = create_test_config(db_path.to_str().unwrap());

    let page_id = {
        let storage = SqliteStorage::new(&db_path).unwrap();
        storage
            .create_page(&format!("{}/list", server.uri()), 1)
            .await
            .unwrap()
            .id
    };

    let reports = run_crawl(&config, None).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].page_id, page_id);
    assert_eq!(reports[0].stop, StopReason::Exhausted);

    let storage = SqliteStorage::new(Path::new(&db_path)).unwrap();
    let jobs = storage.jobs_for_page(page_id).await.unwrap();
    assert_eq!(record_ids(&jobs), vec!["a", "b", "c"]);
    assert_eq!(
        storage.get_page(page_id).await.unwrap().status,
        PageStatus::Waiting
    );
}

#[tokio::test]
async fn test_run_crawl_unknown_page_id() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("spider.db");
    let config = create_test_config(db_path.to_str().unwrap());

    let result = run_crawl(&config, Some(12345)).await;
    assert!(result.is_err());
}
