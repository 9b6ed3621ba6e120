//! Selector-based parsing rules
//!
//! This module turns a fetched career page into candidate jobs:
//! - One element per job, picked by the blueprint's list selector
//! - Field values extracted as text, attributes, inner HTML, lists or dates
//! - Relative links resolved against the page URL
//! - The next continuation token for cursor-token pagination

use crate::config::{BlueprintConfig, FieldConfig, FieldKind};
use crate::ParseError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

/// A job as read off the page, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedJob {
    pub title: Option<String>,
    pub external_id: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub level: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Fields the blueprint extracts beyond the standard ones
    pub extra: Map<String, Value>,
}

/// Parsing-rule capability supplied per blueprint
pub trait ParsingRules: Send + Sync {
    /// Extracts candidate jobs from raw page content
    fn parse(&self, content: &str, page_url: &str) -> Result<Vec<ParsedJob>, ParseError>;

    /// Continuation token for the following page, if the page carries one
    fn next_token(&self, _content: &str) -> Option<String> {
        None
    }

    /// Explicit end-of-results signal, if the page carries one
    fn has_more(&self, _content: &str) -> Option<bool> {
        None
    }

    /// Returns false if the rules cannot extract anything useful
    fn is_configured(&self) -> bool {
        true
    }
}

struct CompiledField {
    config: FieldConfig,
    selector: Option<Selector>,
}

enum FieldValue {
    Text(String),
    List(Vec<String>),
    Date(DateTime<Utc>),
}

impl FieldValue {
    fn into_text(self) -> String {
        match self {
            FieldValue::Text(text) => text,
            FieldValue::List(items) => items.join(", "),
            FieldValue::Date(date) => date.to_rfc3339(),
        }
    }

    fn into_json(self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text),
            FieldValue::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
            FieldValue::Date(date) => Value::String(date.to_rfc3339()),
        }
    }
}

/// CSS selector rules compiled from a blueprint's `[blueprint.parser]` table
pub struct SelectorRules {
    list: Option<Selector>,
    fields: Vec<CompiledField>,
    tag_fields: Vec<String>,
    description_field: String,
    token: Option<Selector>,
}

impl SelectorRules {
    /// Compiles every selector of a blueprint
    ///
    /// # Returns
    ///
    /// * `Ok(SelectorRules)` - All selectors compiled
    /// * `Err(ParseError::Selector)` - A selector is not valid CSS
    pub fn from_config(blueprint: &BlueprintConfig) -> Result<Self, ParseError> {
        let parser = &blueprint.parser;
        let list = compile_optional(&parser.list_selector)?;
        let token = compile_optional(&blueprint.paging.token_selector)?;

        let fields = parser
            .fields
            .iter()
            .map(|field| {
                Ok(CompiledField {
                    selector: compile_optional(&field.selector)?,
                    config: field.clone(),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Self {
            list,
            fields,
            tag_fields: parser.tag_fields.iter().map(|t| t.trim().to_string()).collect(),
            description_field: parser.description_field.trim().to_string(),
            token,
        })
    }

    fn extract_job(&self, element: ElementRef<'_>, base: Option<&Url>) -> Option<ParsedJob> {
        let mut job = ParsedJob::default();

        for field in &self.fields {
            let name = field.config.name.trim();
            let value = match extract_field(field, element, base) {
                Some(value) => value,
                None if field.config.required => return None,
                None => continue,
            };

            if self.tag_fields.iter().any(|t| t == name) {
                match value {
                    FieldValue::List(items) => job.tags.extend(items),
                    other => job.tags.push(other.into_text()),
                }
                continue;
            }

            if !self.description_field.is_empty() && name == self.description_field {
                job.description = Some(value.into_text());
                continue;
            }

            match name {
                "title" => job.title = Some(value.into_text()),
                "external_id" | "external-id" | "id" => job.external_id = Some(value.into_text()),
                "company" => job.company = Some(value.into_text()),
                "location" => job.location = Some(value.into_text()),
                "level" => job.level = Some(value.into_text()),
                "url" => job.url = Some(value.into_text()),
                "description" => job.description = Some(value.into_text()),
                "posted_at" | "posted-at" => {
                    job.posted_at = match value {
                        FieldValue::Date(date) => Some(date),
                        other => parse_date(&other.into_text(), ""),
                    }
                }
                _ => {
                    job.extra.insert(name.to_string(), value.into_json());
                }
            }
        }

        if job.description.is_none() && self.description_field.is_empty() {
            job.description = Some(element.inner_html());
        }

        Some(job)
    }
}

impl ParsingRules for SelectorRules {
    fn parse(&self, content: &str, page_url: &str) -> Result<Vec<ParsedJob>, ParseError> {
        if content.trim().is_empty() {
            return Err(ParseError::Malformed("empty page content".to_string()));
        }
        let list = match &self.list {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };

        let base = Url::parse(page_url).ok();
        let document = Html::parse_document(content);

        Ok(document
            .select(list)
            .filter_map(|element| self.extract_job(element, base.as_ref()))
            .collect())
    }

    fn next_token(&self, content: &str) -> Option<String> {
        let selector = self.token.as_ref()?;
        let document = Html::parse_document(content);
        let token = document.select(selector).next().map(|element| {
            element
                .value()
                .attr("data-token")
                .map(str::to_string)
                .unwrap_or_else(|| collapse_whitespace(element.text()))
        })?;
        let token = token.trim().to_string();
        (!token.is_empty()).then_some(token)
    }

    fn is_configured(&self) -> bool {
        self.list.is_some() && self.fields.iter().any(|f| f.config.name.trim() == "title")
    }
}

fn compile_optional(selector: &str) -> Result<Option<Selector>, ParseError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Ok(None);
    }
    Selector::parse(selector)
        .map(Some)
        .map_err(|e| ParseError::Selector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}

fn extract_field(field: &CompiledField, element: ElementRef<'_>, base: Option<&Url>) -> Option<FieldValue> {
    let config = &field.config;
    if config.kind == FieldKind::Constant {
        let value = config.constant.trim();
        return (!value.is_empty()).then(|| FieldValue::Text(value.to_string()));
    }

    let mut matches: Vec<ElementRef<'_>> = match &field.selector {
        Some(selector) => element.select(selector).collect(),
        None => vec![element],
    };

    match config.kind {
        FieldKind::Text => {
            let first = matches.drain(..).next()?;
            non_empty(collapse_whitespace(first.text())).map(FieldValue::Text)
        }
        FieldKind::Html => {
            let first = matches.drain(..).next()?;
            non_empty(first.inner_html().trim().to_string()).map(FieldValue::Text)
        }
        FieldKind::Attribute => {
            let attribute = if config.attribute.trim().is_empty() {
                "href"
            } else {
                config.attribute.trim()
            };
            let raw = matches.iter().find_map(|m| m.value().attr(attribute))?;
            if attribute == "href" || attribute == "src" {
                let field_base = Url::parse(config.base_url.trim()).ok();
                resolve_link(raw, field_base.as_ref().or(base)).map(FieldValue::Text)
            } else {
                non_empty(raw.trim().to_string()).map(FieldValue::Text)
            }
        }
        FieldKind::List => {
            let delimiter = config.delimiter.as_deref().unwrap_or(",");
            let items: Vec<String> = matches
                .iter()
                .flat_map(|m| {
                    let text = collapse_whitespace(m.text());
                    text.split(delimiter)
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                })
                .collect();
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Date => {
            let first = matches.drain(..).next()?;
            let raw = if config.attribute.trim().is_empty() {
                collapse_whitespace(first.text())
            } else {
                first.value().attr(config.attribute.trim())?.to_string()
            };
            parse_date(&raw, config.format.trim()).map(FieldValue::Date)
        }
        FieldKind::Constant => None,
    }
}

/// Parses a date as RFC 3339, or with a chrono format interpreted as UTC
fn parse_date(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if format.is_empty() {
        return DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only anchors
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}

pub(crate) fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PagingConfig, PagingMode, ParserConfig};
    use chrono::TimeZone;

    const PAGE: &str = r#"
        <html><body>
          <ul>
            <li class="job" data-id="eng-1">
              <h2> Backend   Engineer </h2>
              <a class="apply" href="/jobs/eng-1">Apply</a>
              <span class="loc">Berlin</span>
              <span class="tags">Rust, Go</span>
              <time datetime="2024-03-01T10:00:00Z">1 March</time>
            </li>
            <li class="job" data-id="des-2">
              <h2>Designer</h2>
              <a class="apply" href="mailto:jobs@acme.test">Apply</a>
              <time>2024-02-20</time>
            </li>
            <li class="job">
              <span class="loc">Nowhere</span>
            </li>
          </ul>
          <nav><span class="next" data-token="page-2-token">Next</span></nav>
        </body></html>
    "#;

    fn field(name: &str, kind: FieldKind, selector: &str) -> FieldConfig {
        FieldConfig {
            name: name.to_string(),
            kind,
            selector: selector.to_string(),
            attribute: String::new(),
            constant: String::new(),
            format: String::new(),
            delimiter: None,
            required: false,
            base_url: String::new(),
        }
    }

    fn blueprint(fields: Vec<FieldConfig>) -> BlueprintConfig {
        BlueprintConfig {
            code: "acme".to_string(),
            name: String::new(),
            enabled: true,
            entry_url: "https://careers.acme.test/jobs".to_string(),
            paging: PagingConfig {
                mode: PagingMode::CursorToken,
                token_selector: ".next".to_string(),
                ..PagingConfig::default()
            },
            parser: ParserConfig {
                list_selector: "li.job".to_string(),
                fields,
                tag_fields: vec!["tags".to_string()],
                description_field: String::new(),
            },
        }
    }

    fn standard_fields() -> Vec<FieldConfig> {
        let mut title = field("title", FieldKind::Text, "h2");
        title.required = true;
        let mut id = field("external_id", FieldKind::Attribute, "");
        id.attribute = "data-id".to_string();
        let mut posted = field("posted_at", FieldKind::Date, "time");
        posted.attribute = "datetime".to_string();
        vec![
            title,
            id,
            field("url", FieldKind::Attribute, "a.apply"),
            field("location", FieldKind::Text, ".loc"),
            field("tags", FieldKind::List, ".tags"),
            posted,
        ]
    }

    #[test]
    fn test_extracts_jobs_and_drops_required_misses() {
        let rules = SelectorRules::from_config(&blueprint(standard_fields())).unwrap();
        let jobs = rules.parse(PAGE, "https://careers.acme.test/jobs?page=1").unwrap();

        assert_eq!(jobs.len(), 2);
        let first = &jobs[0];
        assert_eq!(first.title.as_deref(), Some("Backend Engineer"));
        assert_eq!(first.external_id.as_deref(), Some("eng-1"));
        assert_eq!(first.url.as_deref(), Some("https://careers.acme.test/jobs/eng-1"));
        assert_eq!(first.location.as_deref(), Some("Berlin"));
        assert_eq!(first.tags, vec!["Rust".to_string(), "Go".to_string()]);
        assert_eq!(
            first.posted_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert!(first.description.as_deref().unwrap_or("").contains("<h2>"));
    }

    #[test]
    fn test_skips_non_http_links_and_missing_attributes() {
        let rules = SelectorRules::from_config(&blueprint(standard_fields())).unwrap();
        let jobs = rules.parse(PAGE, "https://careers.acme.test/jobs").unwrap();

        let second = &jobs[1];
        assert_eq!(second.url, None);
        assert_eq!(second.posted_at, None);
    }

    #[test]
    fn test_date_format_field() {
        let mut posted = field("posted_at", FieldKind::Date, "time");
        posted.format = "%Y-%m-%d".to_string();
        let mut fields = vec![field("title", FieldKind::Text, "h2")];
        fields.push(posted);

        let rules = SelectorRules::from_config(&blueprint(fields)).unwrap();
        let jobs = rules.parse(PAGE, "https://careers.acme.test/jobs").unwrap();

        assert_eq!(
            jobs[1].posted_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_constant_and_extra_fields() {
        let mut constant = field("company", FieldKind::Constant, "");
        constant.constant = "Acme".to_string();
        let fields = vec![
            field("title", FieldKind::Text, "h2"),
            constant,
            field("team", FieldKind::Text, ".loc"),
        ];
        let rules = SelectorRules::from_config(&blueprint(fields)).unwrap();
        let jobs = rules.parse(PAGE, "https://careers.acme.test/jobs").unwrap();

        assert_eq!(jobs[0].company.as_deref(), Some("Acme"));
        assert_eq!(jobs[0].extra.get("team"), Some(&Value::String("Berlin".to_string())));
    }

    #[test]
    fn test_next_token() {
        let rules = SelectorRules::from_config(&blueprint(standard_fields())).unwrap();
        assert_eq!(rules.next_token(PAGE).as_deref(), Some("page-2-token"));
        assert_eq!(rules.next_token("<html><body></body></html>"), None);
    }

    #[test]
    fn test_invalid_selector_is_parse_error() {
        let fields = vec![field("title", FieldKind::Text, "h2[[")];
        let result = SelectorRules::from_config(&blueprint(fields));
        assert!(matches!(result, Err(ParseError::Selector { .. })));
    }

    #[test]
    fn test_is_configured_requires_list_and_title() {
        let rules = SelectorRules::from_config(&blueprint(standard_fields())).unwrap();
        assert!(rules.is_configured());

        let untitled = SelectorRules::from_config(&blueprint(vec![field(
            "location",
            FieldKind::Text,
            ".loc",
        )]))
        .unwrap();
        assert!(!untitled.is_configured());
    }

    #[test]
    fn test_empty_content_is_malformed() {
        let rules = SelectorRules::from_config(&blueprint(standard_fields())).unwrap();
        assert!(matches!(
            rules.parse("   ", "https://careers.acme.test/jobs"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://example.com/jobs/").unwrap();
        assert_eq!(
            resolve_link("42", Some(&base)),
            Some("https://example.com/jobs/42".to_string())
        );
        assert_eq!(resolve_link("javascript:void(0)", Some(&base)), None);
        assert_eq!(resolve_link("#top", Some(&base)), None);
        assert_eq!(resolve_link("/relative", None), None);
    }
}
