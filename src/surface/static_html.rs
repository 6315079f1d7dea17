//! Page surface for documents that need no JavaScript.
//!
//! Pages are fetched over HTTP (or read from `file://` URLs, or from an
//! in-memory fixture map) and parsed with `scraper`. The common DOM
//! properties are emulated on top of the parsed tree.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::info;

use crate::traits::PageSurface;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Position of an element in document order. Stable for one loaded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticElement(usize);

enum Source {
    Http(Client),
    Fixtures(HashMap<String, String>),
}

pub struct StaticSurface {
    source: Source,
    // `scraper::Html` is not `Send`, so only the markup is kept and parsed
    // again for every query.
    document: Option<String>,
    page_url: Option<Url>,
}

impl StaticSurface {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            source: Source::Http(client),
            document: None,
            page_url: None,
        })
    }

    /// Surface serving fixed markup per URL. Unknown URLs fail to navigate.
    pub fn from_fixtures<I, K, V>(pages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            source: Source::Fixtures(
                pages
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            document: None,
            page_url: None,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        if let Some(path) = url.strip_prefix("file://") {
            return tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {path}"));
        }

        match &self.source {
            Source::Fixtures(pages) => pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("no fixture for {url}")),
            Source::Http(client) => {
                let response = client.get(url).send().await?;

                if !response.status().is_success() {
                    return Err(anyhow!("Failed to fetch {url}: {}", response.status()));
                }

                Ok(response.text().await?)
            }
        }
    }

    /// Run `f` against a freshly parsed copy of the current document
    fn with_document<T>(&self, f: impl FnOnce(&[ElementRef<'_>]) -> Result<T>) -> Result<T> {
        let markup = self
            .document
            .as_deref()
            .ok_or_else(|| anyhow!("no document loaded"))?;
        let document = Html::parse_document(markup);
        let elements: Vec<ElementRef<'_>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();
        f(&elements)
    }
}

#[async_trait]
impl PageSurface for StaticSurface {
    type Element = StaticElement;

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.document = None;
        self.page_url = None;
        let markup = self.fetch(url).await?;
        info!("Loaded static page {} ({} bytes)", url, markup.len());
        self.document = Some(markup);
        self.page_url = Url::parse(url).ok();
        Ok(())
    }

    async fn wait_for_idle(&mut self) -> Result<()> {
        Ok(())
    }

    /// Static documents have no layout, so the reported height is zero and
    /// lazy-loading stops after one tick.
    async fn scroll_by(&mut self, _distance: u32) -> Result<u64> {
        Ok(0)
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<StaticElement>> {
        let selector = parse_selector(selector)?;
        self.with_document(|elements| {
            let root = elements.first().ok_or_else(|| anyhow!("empty document"))?;
            let positions: HashMap<_, usize> =
                elements.iter().enumerate().map(|(i, el)| (el.id(), i)).collect();
            let mut matched: Vec<StaticElement> = root
                .select(&selector)
                .filter_map(|el| positions.get(&el.id()).copied())
                .map(StaticElement)
                .collect();
            // `select` only looks at descendants
            if selector.matches(root) {
                matched.insert(0, StaticElement(0));
            }
            Ok(matched)
        })
    }

    async fn query_within(
        &mut self,
        element: &StaticElement,
        selector: &str,
    ) -> Result<Vec<StaticElement>> {
        let selector = parse_selector(selector)?;
        self.with_document(|elements| {
            let scope = lookup(elements, element)?;
            let positions: HashMap<_, usize> =
                elements.iter().enumerate().map(|(i, el)| (el.id(), i)).collect();
            Ok(scope
                .select(&selector)
                .filter_map(|el| positions.get(&el.id()).copied())
                .map(StaticElement)
                .collect())
        })
    }

    async fn read_property(&mut self, element: &StaticElement, path: &[String]) -> Result<Value> {
        let base = self.page_url.as_ref();
        self.with_document(|elements| {
            let mut current = Prop::Node(lookup(elements, element)?);
            for segment in path {
                current = match current {
                    Prop::Node(el) => node_property(el, segment, base),
                    Prop::Json(value) => json_property(value, segment),
                };
                if matches!(current, Prop::Json(Value::Null)) {
                    break;
                }
            }
            Ok(match current {
                Prop::Node(el) => Value::String(el.html()),
                Prop::Json(value) => value,
            })
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.document = None;
        self.page_url = None;
        Ok(())
    }
}

enum Prop<'a> {
    Node(ElementRef<'a>),
    Json(Value),
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Failed to parse selector `{selector}`: {e:?}"))
}

fn lookup<'a>(elements: &[ElementRef<'a>], element: &StaticElement) -> Result<ElementRef<'a>> {
    elements
        .get(element.0)
        .copied()
        .ok_or_else(|| anyhow!("stale element handle {}", element.0))
}

fn node_or_null(el: Option<ElementRef<'_>>) -> Prop<'_> {
    el.map_or(Prop::Json(Value::Null), Prop::Node)
}

/// The subset of DOM element properties a static document can answer.
/// Unknown names fall back to the attribute of the same name. Like the DOM
/// properties, `href`, `src` and `action` come back resolved against `base`.
fn node_property<'a>(el: ElementRef<'a>, name: &str, base: Option<&Url>) -> Prop<'a> {
    let string = |s: String| Prop::Json(Value::String(s));
    match name {
        "textContent" | "innerText" | "text" => string(el.text().collect()),
        "innerHTML" => string(el.inner_html()),
        "outerHTML" => string(el.html()),
        "tagName" | "nodeName" => string(el.value().name().to_ascii_uppercase()),
        "localName" => string(el.value().name().to_string()),
        "id" => string(el.value().id().unwrap_or_default().to_string()),
        "className" => string(el.value().attr("class").unwrap_or_default().to_string()),
        "dataset" => Prop::Json(Value::Object(dataset(el))),
        "parentElement" => node_or_null(el.parent().and_then(ElementRef::wrap)),
        "firstElementChild" => node_or_null(el.children().find_map(ElementRef::wrap)),
        "lastElementChild" => node_or_null(el.children().filter_map(ElementRef::wrap).last()),
        "nextElementSibling" => node_or_null(el.next_siblings().find_map(ElementRef::wrap)),
        "previousElementSibling" => node_or_null(el.prev_siblings().find_map(ElementRef::wrap)),
        "childElementCount" => Prop::Json(Value::from(
            el.children().filter_map(ElementRef::wrap).count(),
        )),
        "href" | "src" | "action" => match el.value().attr(name) {
            Some(v) => string(absolute_url(base, v)),
            None => Prop::Json(Value::Null),
        },
        other => match el
            .value()
            .attr(other)
            .or_else(|| el.value().attr(&other.to_ascii_lowercase()))
        {
            Some(v) => string(v.to_string()),
            None => Prop::Json(Value::Null),
        },
    }
}

/// Attribute value as a URL relative to the page, kept verbatim when it
/// cannot be joined
fn absolute_url(base: Option<&Url>, raw: &str) -> String {
    base.and_then(|b| b.join(raw.trim()).ok())
        .map_or_else(|| raw.to_string(), String::from)
}

fn json_property<'a>(value: Value, key: &str) -> Prop<'a> {
    let next = match value {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
        Value::Array(mut items) => match key.parse::<usize>() {
            Ok(i) if i < items.len() => items.swap_remove(i),
            _ if key == "length" => Value::from(items.len()),
            _ => Value::Null,
        },
        Value::String(s) if key == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    };
    Prop::Json(next)
}

/// `data-*` attributes keyed the way `HTMLElement.dataset` names them
fn dataset(el: ElementRef<'_>) -> Map<String, Value> {
    el.value()
        .attrs()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix("data-")?;
            let mut camel = String::with_capacity(key.len());
            let mut upper = false;
            for ch in key.chars() {
                if ch == '-' {
                    upper = true;
                } else if upper {
                    camel.extend(ch.to_uppercase());
                    upper = false;
                } else {
                    camel.push(ch);
                }
            }
            Some((camel, Value::String(value.to_string())))
        })
        .collect()
}
