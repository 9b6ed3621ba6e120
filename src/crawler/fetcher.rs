//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests to fetch page content
//! - Error classification into timeouts, transport failures and bad statuses
//!
//! Retries and per-attempt deadlines are owned by the session controller.

use crate::config::UserAgentConfig;
use crate::crawler::pagination::CrawlPageRequest;
use crate::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

/// Raw content of one fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPageSnapshot {
    /// Final URL after redirects
    pub url: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
    pub status: u16,
}

/// Fetch capability used by crawl sessions
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Loads the page at `url` for the given request
    async fn fetch(&self, request: &CrawlPageRequest, url: &str) -> Result<CrawlPageSnapshot, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Upper bound for a single request
///
/// # Example
///
/// ```no_run
/// use job_crawler::config::UserAgentConfig;
/// use job_crawler::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "JobCrawler".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(90)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL)
    let user_agent = format!(
        "{}/{} (+{})",
        config.crawler_name, config.crawler_version, config.contact_url
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP with a shared client
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the fetcher with a client sized for the slowest (first) page
    pub fn from_config(user_agent: &UserAgentConfig, navigation_timeout: Duration) -> Result<Self, FetchError> {
        let client = build_http_client(user_agent, navigation_timeout).map_err(|e| FetchError::Transport {
            url: String::new(),
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, request: &CrawlPageRequest, url: &str) -> Result<CrawlPageSnapshot, FetchError> {
        tracing::debug!(
            blueprint = %request.blueprint_code,
            page = request.pagination.page,
            url,
            "Fetching page"
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content = response.text().await.map_err(|e| classify_error(url, e))?;

        Ok(CrawlPageSnapshot {
            url: final_url,
            content,
            fetched_at: Utc::now(),
            status: status.as_u16(),
        })
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            after: Duration::ZERO,
        }
    } else if error.is_connect() {
        FetchError::Transport {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
