//! Listing page parsing
//!
//! A parser is primed with the page it is about to read (`setup`) and then
//! turns the fetched content into a `ParserResult`: the records on the page
//! and, if there is one, where the next page lives. Parsing does no I/O.

use crate::config::{split_field_selector, ParserConfig};
use crate::storage::PageRecord;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Content could not be turned into a `ParserResult`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to parse page {page_number} of {url}: {message}")]
pub struct ParseError {
    pub url: String,
    pub page_number: u32,
    pub message: String,
}

/// One record extracted from a listing page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: BTreeMap<String, String>,
}

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Where pagination continues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPage {
    pub page_url: String,
    pub page_number: u32,
}

/// Output of one parse call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserResult {
    pub records: Vec<ExtractedRecord>,
    /// None once pagination has ended
    pub next_page: Option<NextPage>,
}

/// Capability to extract records and the next-page pointer from content
pub trait Parser: Send {
    /// Primes the parser with the page about to be parsed
    fn setup(&mut self, page: &PageRecord, page_url: &str, page_number: u32);

    /// Parses content fetched for the primed page
    fn parse(&self, content: &str) -> Result<ParserResult, ParseError>;
}

#[derive(Debug, Clone)]
struct ParseContext {
    page_id: i64,
    page_url: String,
    page_number: u32,
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    selector: Selector,
    attr: Option<String>,
}

/// CSS-selector driven listing parser
///
/// Every element matching `item-selector` becomes one record. Fields are read
/// from descendants of that element; `href`/`src` attributes are resolved to
/// absolute URLs. The first `next-selector` match with an `href` is the next
/// page, numbered one past the current page.
#[derive(Debug, Clone)]
pub struct SelectorParser {
    item: Selector,
    next: Selector,
    fields: Vec<FieldRule>,
    context: Option<ParseContext>,
}

impl SelectorParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        let fields = config
            .fields
            .iter()
            .map(|(name, rule)| {
                let (selector, attr) = split_field_selector(rule);
                Ok(FieldRule {
                    name: name.clone(),
                    selector: compile(selector)?,
                    attr: attr.map(str::to_string),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            item: compile(&config.item_selector)?,
            next: compile(&config.next_selector)?,
            fields,
            context: None,
        })
    }

    fn extract_record(&self, item: ElementRef<'_>, base: &Url) -> ExtractedRecord {
        if self.fields.is_empty() {
            return ExtractedRecord::new().with_field("text", element_text(item));
        }

        let mut record = ExtractedRecord::new();
        for rule in &self.fields {
            let Some(element) = item.select(&rule.selector).next() else {
                continue;
            };

            let value = match rule.attr.as_deref() {
                Some(attr @ ("href" | "src")) => element
                    .value()
                    .attr(attr)
                    .and_then(|raw| base.join(raw.trim()).ok())
                    .map(|url| url.to_string()),
                Some(attr) => element.value().attr(attr).map(|v| v.trim().to_string()),
                None => Some(element_text(element)),
            };

            if let Some(value) = value.filter(|v| !v.is_empty()) {
                record.insert(rule.name.clone(), value);
            }
        }
        record
    }
}

impl Parser for SelectorParser {
    fn setup(&mut self, page: &PageRecord, page_url: &str, page_number: u32) {
        self.context = Some(ParseContext {
            page_id: page.id,
            page_url: page_url.to_string(),
            page_number,
        });
    }

    fn parse(&self, content: &str) -> Result<ParserResult, ParseError> {
        let context = self.context.as_ref().ok_or_else(|| ParseError {
            url: String::new(),
            page_number: 0,
            message: "parse called before setup".to_string(),
        })?;

        let fail = |message: String| ParseError {
            url: context.page_url.clone(),
            page_number: context.page_number,
            message,
        };

        if content.trim().is_empty() {
            return Err(fail("empty content".to_string()));
        }
        if !has_document_markup(content) {
            return Err(fail("content has no document body".to_string()));
        }

        let base = Url::parse(&context.page_url)
            .map_err(|e| fail(format!("page URL is not absolute: {}", e)))?;
        let document = Html::parse_document(content);

        let records: Vec<ExtractedRecord> = document
            .select(&self.item)
            .map(|item| self.extract_record(item, &base))
            .filter(|record| !record.is_empty())
            .collect();

        let next_page = match document
            .select(&self.next)
            .find_map(|link| link.value().attr("href"))
        {
            Some(href) => {
                let next_url = base
                    .join(href.trim())
                    .map_err(|e| fail(format!("bad next-page link '{}': {}", href, e)))?;
                // A "next" link back to the same page marks the end of the listing.
                (next_url != base).then(|| NextPage {
                    page_url: next_url.to_string(),
                    page_number: context.page_number + 1,
                })
            }
            None => None,
        };

        tracing::debug!(
            page_id = context.page_id,
            "Parsed page {} of {}: {} records, next: {:?}",
            context.page_number,
            context.page_url,
            records.len(),
            next_page.as_ref().map(|next| next.page_url.as_str())
        );

        Ok(ParserResult { records, next_page })
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// True if the source carries an `<html>` or `<body>` element
fn has_document_markup(content: &str) -> bool {
    let lowered = content.to_ascii_lowercase();
    lowered.contains("<html") || lowered.contains("<body")
}

/// Element text with runs of whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
