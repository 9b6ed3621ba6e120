//! HTTP fetcher tests against wiremock servers

use job_crawler::config::{
    BlueprintConfig, CrawlerConfig, FieldConfig, FieldKind, PagingConfig, PagingMode, ParserConfig,
    UserAgentConfig,
};
use job_crawler::crawler::{
    CrawlBlueprint, CrawlContext, CrawlPageRequest, HttpPageFetcher, PageFetcher, PaginationDriver,
    SessionController,
};
use job_crawler::storage::SqliteStore;
use job_crawler::{FetchError, SessionState};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestCrawler".to_string(),
        crawler_version: "1.0".to_string(),
        contact_url: "https://example.com/about".to_string(),
    }
}

fn request() -> CrawlPageRequest {
    PaginationDriver::initial("board", &CrawlContext::new("board"), 20, 1)
}

#[tokio::test]
async fn test_fetch_success_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(header("user-agent", "TestCrawler/1.0 (+https://example.com/about)"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::from_config(&user_agent(), Duration::from_secs(5)).unwrap();
    let url = format!("{}/jobs", server.uri());
    let snapshot = fetcher.fetch(&request(), &url).await.unwrap();

    assert_eq!(snapshot.status, 200);
    assert_eq!(snapshot.url, url);
    assert!(snapshot.content.contains("ok"));
}

#[tokio::test]
async fn test_fetch_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::from_config(&user_agent(), Duration::from_secs(5)).unwrap();
    let result = fetcher
        .fetch(&request(), &format!("{}/missing", server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_fetch_client_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::from_config(&user_agent(), Duration::from_millis(100)).unwrap();
    let result = fetcher.fetch(&request(), &format!("{}/slow", server.uri())).await;

    assert!(matches!(result, Err(FetchError::Timeout { .. })));
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    // Bind and release a port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/jobs", listener.local_addr().unwrap());
    drop(listener);

    let fetcher = HttpPageFetcher::from_config(&user_agent(), Duration::from_secs(2)).unwrap();
    let result = fetcher.fetch(&request(), &url).await;

    assert!(matches!(result, Err(FetchError::Transport { .. })));
}

fn field(name: &str, kind: FieldKind, selector: &str, attribute: &str) -> FieldConfig {
    FieldConfig {
        name: name.to_string(),
        kind,
        selector: selector.to_string(),
        attribute: attribute.to_string(),
        constant: String::new(),
        format: String::new(),
        delimiter: None,
        required: false,
        base_url: String::new(),
    }
}

fn listing(jobs: &[(&str, &str, &str)]) -> String {
    let items: String = jobs
        .iter()
        .map(|(id, title, posted)| {
            format!(
                r#"<li class="job" data-id="{id}"><a href="/jobs/{id}">{title}</a><time datetime="{posted}"></time></li>"#
            )
        })
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", items)
}

#[tokio::test]
async fn test_session_over_http_with_selector_rules() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/careers"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[
            ("eng-2", "Platform Engineer", "2024-06-02T09:00:00Z"),
            ("eng-1", "Backend Engineer", "2024-06-01T09:00:00Z"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/careers"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .mount(&server)
        .await;

    let config = BlueprintConfig {
        code: "acme".to_string(),
        name: "Acme careers".to_string(),
        enabled: true,
        entry_url: format!("{}/careers", server.uri()),
        paging: PagingConfig {
            mode: PagingMode::PageIndex,
            max_pages: 5,
            ..PagingConfig::default()
        },
        parser: ParserConfig {
            list_selector: "li.job".to_string(),
            fields: vec![
                field("title", FieldKind::Text, "a", ""),
                field("external_id", FieldKind::Attribute, "", "data-id"),
                field("url", FieldKind::Attribute, "a", "href"),
                field("posted_at", FieldKind::Date, "time", "datetime"),
            ],
            tag_fields: Vec::new(),
            description_field: String::new(),
        },
    };
    let blueprint = Arc::new(CrawlBlueprint::from_config(&config).unwrap());

    let fetcher = Arc::new(HttpPageFetcher::from_config(&user_agent(), Duration::from_secs(5)).unwrap());
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let controller = SessionController::new(fetcher, store.clone(), store.clone(), CrawlerConfig::default());

    let outcome = controller
        .run(blueprint, CrawlContext::new("acme").with_company("Acme"))
        .await
        .unwrap();

    assert_eq!(outcome.state, SessionState::Done);
    assert_eq!(outcome.metrics.pages_fetched, 2);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].external_id, "eng-2");
    assert_eq!(outcome.results[0].company.as_deref(), Some("Acme"));
    assert_eq!(
        outcome.results[1].url.as_deref(),
        Some(format!("{}/jobs/eng-1", server.uri()).as_str())
    );

    let job = store.get_job("crawler:acme", "eng-1").unwrap().unwrap();
    assert_eq!(job.title, "Backend Engineer");
}
