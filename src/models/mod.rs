//! Data models for selector configuration and scraped records

use std::collections::BTreeMap;
use std::fmt;

/// Placeholder substituted with the page number in the base URL template
pub const PAGE_PLACEHOLDER: &str = "{iii}";

/// How one field is pulled out of an item element.
///
/// Decided once when the configuration is loaded, so the extraction loop
/// never has to guess from which optional columns were filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Read `property` off the item itself, or off the first descendant
    /// matching `sub_selector`. Textual results are trimmed.
    Direct {
        property: String,
        sub_selector: Option<String>,
    },
    /// Fold `path` over the item's node, stopping at the first absent value.
    Nested { path: Vec<String> },
    /// Read `property` off every descendant matching `sub_selector` and keep
    /// the first one containing any of `candidates`.
    Match {
        sub_selector: String,
        property: String,
        candidates: Vec<String>,
    },
}

/// One named field to extract from every item element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec {
    pub name: String,
    pub access: Access,
}

impl SelectorSpec {
    pub fn direct(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: Access::Direct {
                property: property.into(),
                sub_selector: None,
            },
        }
    }

    pub fn direct_within(
        name: impl Into<String>,
        sub_selector: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            access: Access::Direct {
                property: property.into(),
                sub_selector: Some(sub_selector.into()),
            },
        }
    }

    pub fn nested<I, S>(name: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            access: Access::Nested {
                path: path.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn matching<I, S>(
        name: impl Into<String>,
        sub_selector: impl Into<String>,
        property: impl Into<String>,
        candidates: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            access: Access::Match {
                sub_selector: sub_selector.into(),
                property: property.into(),
                candidates: candidates.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Inclusive page interval substituted into the URL template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeRange {
    pub from: u32,
    pub to: u32,
}

impl ScrapeRange {
    /// Returns `None` when `from > to`.
    pub fn new(from: u32, to: u32) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.from..=self.to
    }

    pub fn page_count(&self) -> usize {
        (self.to - self.from) as usize + 1
    }
}

/// Which page surface drives the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Renderer {
    /// Real browser session over the WebDriver protocol
    #[default]
    WebDriver,
    /// Plain HTTP fetch + HTML parsing, no JavaScript
    Static,
}

impl std::str::FromStr for Renderer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webdriver" | "browser" => Ok(Self::WebDriver),
            "static" | "http" => Ok(Self::Static),
            other => Err(format!("unknown renderer '{other}'")),
        }
    }
}

/// Immutable run configuration, built once by the loader
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// URL template containing [`PAGE_PLACEHOLDER`]
    pub base_url: String,
    /// Selector matching one item element per record
    pub base_selector: String,
    pub range: ScrapeRange,
    /// Field selectors in declaration order
    pub selectors: Vec<SelectorSpec>,
    pub renderer: Renderer,
    pub webdriver_url: String,
    pub headless: bool,
    pub output_path: String,
    /// Relational sink URL; when set, records are stored there instead of CSV
    pub database_url: Option<String>,
    /// Any other scalar rows of the config file
    pub extras: BTreeMap<String, String>,
}

impl ScrapeConfig {
    pub fn page_url(&self, page: u32) -> String {
        self.base_url.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    /// Field names in declaration order, used as the output column projection
    pub fn field_names(&self) -> Vec<String> {
        self.selectors.iter().map(|s| s.name.clone()).collect()
    }
}

/// One record extracted from one item element.
///
/// Fields keep the declaration order of their selectors; `None` marks a
/// field whose extraction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: Vec<(String, Option<String>)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Values projected onto `columns`, absent or unknown fields as `None`
    pub fn project<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = Option<&'a str>> {
        columns.iter().map(|c| self.get(c))
    }
}

impl<N: Into<String>> FromIterator<(N, Option<String>)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (N, Option<String>)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl fmt::Display for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(n, v)| format!("{n}={}", v.unwrap_or("-")))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Every record of a run, in page order then DOM order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedDataset {
    records: Vec<RawRecord>,
}

impl ScrapedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_page(&mut self, page: Vec<RawRecord>) {
        self.records.extend(page);
    }

    pub fn push(&mut self, record: RawRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
