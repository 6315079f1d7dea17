//! Loader for the tabular (CSV) scrape configuration.
//!
//! Every row has a `type`. `selector` rows describe one output field,
//! exactly one `range` row gives the page interval as `from||to`, and every
//! other type becomes a scalar key (`baseUrl`, `baseSelector`, `output`,
//! `database`, `renderer`, `webdriver`, `headless`, or anything else, which is
//! kept in [`ScrapeConfig::extras`]).

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::{Access, PAGE_PLACEHOLDER, Renderer, ScrapeConfig, ScrapeRange, SelectorSpec};

pub const DEFAULT_OUTPUT_PATH: &str = "output.csv";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
/// Property read when a selector row leaves `scrapeMethod` empty
pub const DEFAULT_PROPERTY: &str = "textContent";

const RANGE_SEPARATOR: &str = "||";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config table: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required `{0}` row")]
    MissingKey(&'static str),
    #[error("expected exactly one `range` row, found {0}")]
    RangeCount(usize),
    #[error("range `{0}` is not of the form `from||to` with non-negative integers")]
    MalformedRange(String),
    #[error("range starts at {from} but ends at {to}")]
    InvertedRange { from: u32, to: u32 },
    #[error("selector row without a name")]
    UnnamedSelector,
    #[error("selector `{0}` is declared more than once")]
    DuplicateSelector(String),
    #[error("selector `{name}` has an empty segment in property path `{method}`")]
    EmptyPathSegment { name: String, method: String },
    #[error("selector `{0}` lists candidate words but no sub-selector")]
    CandidatesWithoutSelector(String),
    #[error("base URL `{0}` has no `{{iii}}` placeholder")]
    MissingPlaceholder(String),
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// One row of the configuration table. Columns beyond these are ignored.
#[derive(Debug, Deserialize)]
struct ConfigRow {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(rename = "scrapeMethod", default)]
    scrape_method: Option<String>,
    #[serde(rename = "scrapeAttribute", default)]
    scrape_attribute: Option<String>,
}

/// Settings supplied from outside the table (command line or environment).
/// Each one that is set replaces the matching table row.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// CSV destination. Also disables any database sink so the file is
    /// actually written.
    pub output: Option<String>,
    pub database: Option<String>,
    pub webdriver: Option<String>,
    /// Only ever turns headless mode on
    pub headless: bool,
}

/// Read and validate the configuration file at `path`
pub fn load(path: &Path) -> Result<ScrapeConfig, ConfigError> {
    load_with(path, &Overrides::default())
}

/// Read the configuration file at `path`, letting `overrides` take
/// precedence over its rows
pub fn load_with(path: &Path, overrides: &Overrides) -> Result<ScrapeConfig, ConfigError> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_with(file, overrides)
}

/// Parse a configuration table from any reader
pub fn parse<R: Read>(reader: R) -> Result<ScrapeConfig, ConfigError> {
    parse_with(reader, &Overrides::default())
}

/// Parse a configuration table, then apply `overrides`
pub fn parse_with<R: Read>(reader: R, overrides: &Overrides) -> Result<ScrapeConfig, ConfigError> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut selectors = Vec::new();
    let mut seen = HashSet::new();
    let mut ranges = Vec::new();
    let mut scalars = BTreeMap::new();

    for row in csv.deserialize::<ConfigRow>() {
        let row = row?;
        let Some(kind) = non_empty(row.kind.clone()) else {
            continue;
        };

        match kind.as_str() {
            "selector" => {
                let spec = selector_from_row(row)?;
                if !seen.insert(spec.name.clone()) {
                    return Err(ConfigError::DuplicateSelector(spec.name));
                }
                selectors.push(spec);
            }
            "range" => ranges.push(non_empty(row.value).unwrap_or_default()),
            _ => {
                scalars.insert(kind, non_empty(row.value).unwrap_or_default());
            }
        }
    }

    let range = match ranges.as_slice() {
        [raw] => parse_range(raw)?,
        other => return Err(ConfigError::RangeCount(other.len())),
    };

    let base_url = take_required(&mut scalars, "baseUrl")?;
    if !base_url.contains(PAGE_PLACEHOLDER) {
        return Err(ConfigError::MissingPlaceholder(base_url));
    }
    let base_selector = take_required(&mut scalars, "baseSelector")?;

    let renderer = match scalars.remove("renderer") {
        Some(raw) => raw.parse::<Renderer>().map_err(|reason| ConfigError::InvalidValue {
            key: "renderer".into(),
            value: raw.clone(),
            reason,
        })?,
        None => Renderer::default(),
    };

    let headless = match scalars.remove("headless") {
        Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "headless".into(),
            value: raw.clone(),
            reason: "expected true or false".into(),
        })?,
        None => false,
    };

    let webdriver = scalars.remove("webdriver").filter(|s| !s.is_empty());
    let output = scalars.remove("output").filter(|s| !s.is_empty());
    let database = scalars.remove("database").filter(|s| !s.is_empty());

    let config = ScrapeConfig {
        base_url,
        base_selector,
        range,
        selectors,
        renderer,
        webdriver_url: overrides
            .webdriver
            .clone()
            .or(webdriver)
            .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
        headless: headless || overrides.headless,
        output_path: overrides
            .output
            .clone()
            .or(output)
            .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
        database_url: match overrides.output {
            Some(_) => None,
            None => overrides.database.clone().or(database),
        },
        extras: scalars,
    };

    debug!("Configuration loaded: {:?}", config);
    Ok(config)
}

/// Decide the access mode of one selector row.
///
/// A method starting with `.` is a nested property path. Otherwise candidate
/// words select attribute matching, and anything else is a direct read.
fn selector_from_row(row: ConfigRow) -> Result<SelectorSpec, ConfigError> {
    let name = non_empty(row.name).ok_or(ConfigError::UnnamedSelector)?;
    let sub_selector = non_empty(row.value);
    let method = non_empty(row.scrape_method);
    let candidates: Vec<String> = non_empty(row.scrape_attribute)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    if let Some(method) = method.as_deref()
        && let Some(rest) = method.strip_prefix('.')
    {
        let path: Vec<String> = rest.split('.').map(String::from).collect();
        if path.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyPathSegment {
                name,
                method: method.to_string(),
            });
        }
        return Ok(SelectorSpec {
            name,
            access: Access::Nested { path },
        });
    }

    let property = method.unwrap_or_else(|| DEFAULT_PROPERTY.to_string());

    if !candidates.is_empty() {
        let sub_selector =
            sub_selector.ok_or_else(|| ConfigError::CandidatesWithoutSelector(name.clone()))?;
        return Ok(SelectorSpec {
            name,
            access: Access::Match {
                sub_selector,
                property,
                candidates,
            },
        });
    }

    Ok(SelectorSpec {
        name,
        access: Access::Direct {
            property,
            sub_selector,
        },
    })
}

fn parse_range(raw: &str) -> Result<ScrapeRange, ConfigError> {
    let malformed = || ConfigError::MalformedRange(raw.to_string());
    let (from, to) = raw.split_once(RANGE_SEPARATOR).ok_or_else(malformed)?;
    let from: u32 = from.trim().parse().map_err(|_| malformed())?;
    let to: u32 = to.trim().parse().map_err(|_| malformed())?;
    ScrapeRange::new(from, to).ok_or(ConfigError::InvertedRange { from, to })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn take_required(
    scalars: &mut BTreeMap<String, String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    scalars
        .remove(key)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingKey(key))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
