use crate::config::SourceConfig;
use crate::ingest::IngestionCursorKey;
use std::collections::BTreeMap;

/// Per-run parameters of one crawl session
///
/// All string fields are trimmed on construction. A blank field means the
/// value was not supplied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CrawlContext {
    pub source_code: String,
    /// Explicit source name for emitted results
    pub source_name: String,
    pub company: String,
    pub category: String,
    /// Replaces the blueprint's entry URL when set
    pub entry_url_override: String,
    pub options: BTreeMap<String, String>,
}

impl CrawlContext {
    pub fn new(source_code: impl AsRef<str>) -> Self {
        Self {
            source_code: source_code.as_ref().trim().to_string(),
            ..Self::default()
        }
    }

    pub fn with_source_name(mut self, source_name: impl AsRef<str>) -> Self {
        self.source_name = source_name.as_ref().trim().to_string();
        self
    }

    pub fn with_company(mut self, company: impl AsRef<str>) -> Self {
        self.company = company.as_ref().trim().to_string();
        self
    }

    pub fn with_category(mut self, category: impl AsRef<str>) -> Self {
        self.category = category.as_ref().trim().to_string();
        self
    }

    pub fn with_entry_url(mut self, url: impl AsRef<str>) -> Self {
        self.entry_url_override = url.as_ref().trim().to_string();
        self
    }

    /// Builds the context for a configured source
    pub fn from_source(source: &SourceConfig) -> Self {
        let mut context = Self::new(&source.code)
            .with_source_name(&source.source_name)
            .with_company(&source.company)
            .with_category(&source.category)
            .with_entry_url(&source.entry_url_override);
        context.options = source
            .options
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        context
    }

    /// Source name stamped on every result
    ///
    /// The explicit name wins; otherwise `crawler:<code>`, or bare `crawler`
    /// when the code is blank.
    pub fn resolved_source_name(&self) -> String {
        if !self.source_name.is_empty() {
            self.source_name.clone()
        } else if !self.source_code.is_empty() {
            format!("crawler:{}", self.source_code)
        } else {
            "crawler".to_string()
        }
    }

    pub fn company_override(&self) -> Option<&str> {
        (!self.company.is_empty()).then_some(self.company.as_str())
    }

    /// Key of the ingestion cursor this session reads and advances
    pub fn cursor_key(&self) -> IngestionCursorKey {
        IngestionCursorKey::new(
            &self.source_code,
            self.resolved_source_name(),
            &self.company,
            &self.category,
        )
    }
}
