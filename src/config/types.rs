use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for Job-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(rename = "enrichment-retry", default)]
    pub enrichment_retry: EnrichmentRetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(rename = "blueprint", default)]
    pub blueprints: Vec<BlueprintConfig>,
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Looks up a blueprint definition by its code
    pub fn blueprint(&self, code: &str) -> Option<&BlueprintConfig> {
        self.blueprints.iter().find(|b| b.code.trim() == code.trim())
    }
}

/// Session timing and fetch retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Bound on every page load of a session (milliseconds)
    #[serde(rename = "navigation-timeout-ms", default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Bound on interactions within an already-loaded page (milliseconds)
    ///
    /// Fetchers that only load pages never wait on an interaction.
    #[serde(rename = "default-timeout-ms", default = "default_default_timeout")]
    pub default_timeout_ms: u64,

    /// Attempts per page before the session fails
    #[serde(rename = "fetch-attempts", default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    /// Base delay between fetch attempts (milliseconds, doubled per attempt)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Cap on the delay between fetch attempts (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Optional overall budget for one session (milliseconds)
    #[serde(rename = "run-budget-ms", default)]
    pub run_budget_ms: Option<u64>,
}

impl CrawlerConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn run_budget(&self) -> Option<Duration> {
        self.run_budget_ms.map(Duration::from_millis)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let millis = self.retry_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms))
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout(),
            default_timeout_ms: default_default_timeout(),
            fetch_attempts: default_fetch_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            max_backoff_ms: default_max_backoff(),
            run_budget_ms: None,
        }
    }
}

fn default_navigation_timeout() -> u64 {
    90_000
}

fn default_default_timeout() -> u64 {
    60_000
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    10_000
}

/// What happens when a session is submitted to a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// The submitter waits for a free queue slot
    #[default]
    Block,
    /// The submission fails immediately with `CrawlError::QueueFull`
    Reject,
}

/// Worker pool configuration for concurrent sessions
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::Block,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    16
}

/// Enrichment retry scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentRetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "enrichment-key", default = "default_enrichment_key")]
    pub enrichment_key: String,

    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(rename = "scheduler-interval-ms", default = "default_scheduler_interval")]
    pub scheduler_interval_ms: u64,

    #[serde(rename = "in-flight-guard-ms", default = "default_in_flight_guard")]
    pub in_flight_guard_ms: u64,

    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initial-delay-ms", default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(rename = "backoff-multiplier", default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl EnrichmentRetryConfig {
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    pub fn in_flight_guard(&self) -> Duration {
        Duration::from_millis(self.in_flight_guard_ms)
    }
}

impl Default for EnrichmentRetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enrichment_key: default_enrichment_key(),
            batch_size: default_batch_size(),
            scheduler_interval_ms: default_scheduler_interval(),
            in_flight_guard_ms: default_in_flight_guard(),
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_enrichment_key() -> String {
    "status".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_scheduler_interval() -> u64 {
    60_000
}

fn default_in_flight_guard() -> u64 {
    300_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    1_800_000
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Declarative description of how one career site is crawled
#[derive(Debug, Clone, Deserialize)]
pub struct BlueprintConfig {
    pub code: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "entry-url", default)]
    pub entry_url: String,

    #[serde(default)]
    pub paging: PagingConfig,

    pub parser: ParserConfig,
}

/// Pagination strategy of a blueprint
#[derive(Debug, Clone, Deserialize)]
pub struct PagingConfig {
    #[serde(default)]
    pub mode: PagingMode,

    #[serde(default)]
    pub parameter: String,

    #[serde(default = "default_start")]
    pub start: i64,

    #[serde(default = "default_step")]
    pub step: i64,

    #[serde(rename = "size-parameter", default)]
    pub size_parameter: String,

    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Cursor-token mode: CSS selector whose text is the next token
    #[serde(rename = "token-selector", default)]
    pub token_selector: String,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            mode: PagingMode::None,
            parameter: String::new(),
            start: default_start(),
            step: default_step(),
            size_parameter: String::new(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            token_selector: String::new(),
        }
    }
}

fn default_start() -> i64 {
    1
}

fn default_step() -> i64 {
    1
}

fn default_page_size() -> u32 {
    20
}

fn default_max_pages() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PagingMode {
    #[default]
    None,
    PageIndex,
    PathSuffix,
    Offset,
    CursorToken,
}

/// Selector-based parsing rules of a blueprint
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    #[serde(rename = "list-selector", default)]
    pub list_selector: String,

    #[serde(rename = "field", default)]
    pub fields: Vec<FieldConfig>,

    #[serde(rename = "tag-fields", default)]
    pub tag_fields: Vec<String>,

    #[serde(rename = "description-field", default)]
    pub description_field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    #[serde(default)]
    pub selector: String,

    #[serde(default)]
    pub attribute: String,

    #[serde(default)]
    pub constant: String,

    /// chrono format string for `date` fields; RFC 3339 when empty
    #[serde(default)]
    pub format: String,

    #[serde(default)]
    pub delimiter: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(rename = "base-url", default)]
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    #[default]
    Text,
    Attribute,
    Html,
    List,
    Date,
    Constant,
}

/// One crawlable source: a blueprint bound to a company/category
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub code: String,

    pub blueprint: String,

    #[serde(rename = "source-name", default)]
    pub source_name: String,

    #[serde(default)]
    pub company: String,

    #[serde(default)]
    pub category: String,

    #[serde(rename = "entry-url-override", default)]
    pub entry_url_override: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = CrawlerConfig {
            retry_backoff_ms: 100,
            max_backoff_ms: 350,
            ..CrawlerConfig::default()
        };

        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
        assert_eq!(config.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_overflow_policy_parses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            overflow: OverflowPolicy,
        }
        let parsed: Wrapper = toml::from_str("overflow = \"reject\"").unwrap();
        assert_eq!(parsed.overflow, OverflowPolicy::Reject);
    }
}
