//! Crawl blueprints and page URL construction

use crate::config::{BlueprintConfig, Config, PagingConfig, PagingMode};
use crate::crawler::context::CrawlContext;
use crate::crawler::pagination::CrawlPagination;
use crate::crawler::parser::{ParsingRules, SelectorRules};
use crate::{CrawlError, FetchError, ParseError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Query parameter carrying the continuation token in cursor-token mode
const TOKEN_PARAMETER: &str = "cursor";

/// How page N of a source is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingStrategy {
    pub mode: PagingMode,
    pub parameter: String,
    pub start: i64,
    pub step: i64,
    pub size_parameter: String,
    pub page_size: u32,
    pub max_pages: u32,
}

impl PagingStrategy {
    /// A single-page strategy
    pub fn disabled() -> Self {
        Self::from_config(&PagingConfig::default())
    }

    pub fn from_config(config: &PagingConfig) -> Self {
        Self {
            mode: config.mode,
            parameter: config.parameter.trim().to_string(),
            start: config.start,
            step: if config.step <= 0 { 1 } else { config.step },
            size_parameter: config.size_parameter.trim().to_string(),
            page_size: config.page_size.max(1),
            max_pages: if config.mode == PagingMode::None {
                1
            } else {
                config.max_pages.max(1)
            },
        }
    }

    /// Builds the URL of the page described by `pagination`
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The page URL
    /// * `Err(FetchError::InvalidUrl)` - The base URL cannot be parsed
    pub fn apply(&self, base: &str, pagination: &CrawlPagination) -> Result<String, FetchError> {
        let base = base.trim();
        if self.mode == PagingMode::None {
            return Ok(base.to_string());
        }

        let mut url = Url::parse(base).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base, e)))?;

        match self.mode {
            PagingMode::None => {}
            PagingMode::PageIndex => {
                let parameter = self.parameter_or("page");
                self.set_query(&mut url, parameter, Some(self.page_value(pagination.page).to_string()), pagination);
            }
            PagingMode::Offset => {
                let parameter = self.parameter_or("offset");
                self.set_query(&mut url, parameter, Some(pagination.offset().to_string()), pagination);
            }
            PagingMode::CursorToken => {
                let parameter = self.parameter_or(TOKEN_PARAMETER);
                let token = if pagination.page <= 1 {
                    None
                } else {
                    pagination.next_token.clone().filter(|t| !t.trim().is_empty())
                };
                self.set_query(&mut url, parameter, token, pagination);
            }
            PagingMode::PathSuffix => {
                let value = self.page_value(pagination.page).to_string();
                let path = url.path().trim_end_matches('/').to_string();
                url.set_path(&format!("{}/{}", path, value));
            }
        }

        Ok(url.to_string())
    }

    fn parameter_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.parameter.is_empty() {
            fallback
        } else {
            &self.parameter
        }
    }

    /// Page number as the source counts it, never below 1
    fn page_value(&self, page: u32) -> i64 {
        let page = i64::from(page.max(1));
        self.start
            .saturating_add((page - 1).saturating_mul(self.step))
            .max(1)
    }

    fn set_query(&self, url: &mut Url, parameter: &str, value: Option<String>, pagination: &CrawlPagination) {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != parameter)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if let Some(value) = value {
            pairs.push((parameter.to_string(), value));
        }
        if !self.size_parameter.is_empty() && !pairs.iter().any(|(k, _)| *k == self.size_parameter) {
            pairs.push((self.size_parameter.clone(), pagination.page_size.max(1).to_string()));
        }

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }
}

/// Declarative description of how one career site is crawled
#[derive(Clone)]
pub struct CrawlBlueprint {
    pub code: String,
    pub name: String,
    pub enabled: bool,
    pub entry_url: String,
    pub paging: PagingStrategy,
    pub rules: Arc<dyn ParsingRules>,
}

impl fmt::Debug for CrawlBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlBlueprint")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("entry_url", &self.entry_url)
            .field("paging", &self.paging)
            .finish_non_exhaustive()
    }
}

impl CrawlBlueprint {
    pub fn new(
        code: impl AsRef<str>,
        entry_url: impl AsRef<str>,
        paging: PagingStrategy,
        rules: Arc<dyn ParsingRules>,
    ) -> Self {
        let code = code.as_ref().trim().to_string();
        Self {
            name: code.clone(),
            code,
            enabled: true,
            entry_url: entry_url.as_ref().trim().to_string(),
            paging,
            rules,
        }
    }

    /// Builds a blueprint with selector rules from its configuration
    pub fn from_config(config: &BlueprintConfig) -> Result<Self, ParseError> {
        let rules = SelectorRules::from_config(config)?;
        let mut blueprint = Self::new(
            &config.code,
            &config.entry_url,
            PagingStrategy::from_config(&config.paging),
            Arc::new(rules),
        );
        blueprint.enabled = config.enabled;
        if !config.name.trim().is_empty() {
            blueprint.name = config.name.trim().to_string();
        }
        Ok(blueprint)
    }

    /// Whether a run has something to fetch and a way to read it
    pub fn is_configured(&self) -> bool {
        !self.entry_url.is_empty() && self.rules.is_configured()
    }

    /// Entry URL for a run, with the context override taking precedence
    pub fn resolve_entry_url<'a>(&'a self, context: &'a CrawlContext) -> &'a str {
        if context.entry_url_override.is_empty() {
            &self.entry_url
        } else {
            &context.entry_url_override
        }
    }

    pub fn page_url(&self, context: &CrawlContext, pagination: &CrawlPagination) -> Result<String, FetchError> {
        let base = self.resolve_entry_url(context);
        if base.is_empty() {
            return Err(FetchError::InvalidUrl(format!(
                "blueprint {} has no entry URL",
                self.code
            )));
        }
        self.paging.apply(base, pagination)
    }
}

/// Blueprints by code, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct BlueprintRegistry {
    blueprints: BTreeMap<String, Arc<CrawlBlueprint>>,
}

impl BlueprintRegistry {
    /// Compiles every configured blueprint
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let mut registry = Self::default();
        for blueprint in &config.blueprints {
            registry.register(CrawlBlueprint::from_config(blueprint)?);
        }
        Ok(registry)
    }

    /// Adds a blueprint, replacing any with the same code
    pub fn register(&mut self, blueprint: CrawlBlueprint) {
        self.blueprints.insert(blueprint.code.clone(), Arc::new(blueprint));
    }

    pub fn get(&self, code: &str) -> crate::Result<Arc<CrawlBlueprint>> {
        self.blueprints
            .get(code.trim())
            .cloned()
            .ok_or_else(|| CrawlError::UnknownBlueprint(code.trim().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CrawlBlueprint>> {
        self.blueprints.values()
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }
}
