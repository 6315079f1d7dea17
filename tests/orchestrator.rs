use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use paged_harvest::engine::{
    EngineTiming, ItemExtractor, ScrapeOrchestrator, ScriptedChannel, trigger_lazy_load,
};
use paged_harvest::models::{Renderer, ScrapeConfig, ScrapeRange, SelectorSpec};
use paged_harvest::traits::PageSurface;

#[derive(Debug, Clone)]
struct MockElement {
    url: String,
    index: usize,
    text: Option<&'static str>,
}

/// Scripted page: `items_per_page` items on every page, optional failing
/// URLs and a number of leading empty base queries. `scroll_fails` and
/// `query_fails_on` make scrolling or the base query error out.
#[derive(Default)]
struct MockSurface {
    items_per_page: usize,
    failing: HashSet<String>,
    empty_queries: usize,
    scroll_height: u64,
    scroll_fails: bool,
    query_fails_on: HashSet<String>,

    current: Option<String>,
    visited: Vec<String>,
    base_queries: usize,
    scrolls: Vec<u32>,
    closed: bool,
}

const TAGS: [&str; 3] = ["For Lease", "For Sale", "Sold"];

#[async_trait]
impl PageSurface for MockSurface {
    type Element = MockElement;

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.visited.push(url.to_string());
        if self.failing.contains(url) {
            self.current = None;
            return Err(anyhow!("net::ERR_CONNECTION_RESET"));
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_idle(&mut self) -> Result<()> {
        Ok(())
    }

    async fn scroll_by(&mut self, distance: u32) -> Result<u64> {
        self.scrolls.push(distance);
        if self.scroll_fails {
            return Err(anyhow!("javascript error: document.body is null"));
        }
        Ok(self.scroll_height)
    }

    async fn query_all(&mut self, _selector: &str) -> Result<Vec<MockElement>> {
        self.base_queries += 1;
        if self.empty_queries > 0 {
            self.empty_queries -= 1;
            return Ok(vec![]);
        }
        let url = self.current.clone().ok_or_else(|| anyhow!("nothing loaded"))?;
        if self.query_fails_on.contains(&url) {
            return Err(anyhow!("invalid session id"));
        }
        Ok((0..self.items_per_page)
            .map(|index| MockElement {
                url: url.clone(),
                index,
                text: None,
            })
            .collect())
    }

    async fn query_within(&mut self, element: &MockElement, selector: &str) -> Result<Vec<MockElement>> {
        match selector {
            "span.tag" => Ok(TAGS
                .iter()
                .map(|t| MockElement {
                    text: Some(*t),
                    ..element.clone()
                })
                .collect()),
            "h2" => Ok(vec![MockElement {
                text: Some("  Heading\n"),
                ..element.clone()
            }]),
            _ => Ok(vec![]),
        }
    }

    async fn read_property(&mut self, element: &MockElement, path: &[String]) -> Result<Value> {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        match (element.text, path.as_slice()) {
            (Some(text), ["textContent"]) => Ok(json!(text)),
            (None, ["title"]) => Ok(json!(format!("  Item {} of {}  ", element.index, element.url))),
            (None, ["dataset", "id"]) => Ok(json!(element.index.to_string())),
            (None, ["dataset", ..]) => Ok(Value::Null),
            (None, ["price"]) => Ok(json!(100 * (element.index + 1))),
            (None, ["broken"]) => Err(anyhow!("Evaluation failed: TypeError")),
            _ => Ok(Value::Null),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn config(from: u32, to: u32, selectors: Vec<SelectorSpec>) -> ScrapeConfig {
    ScrapeConfig {
        base_url: "https://homes.example/list?page={iii}".into(),
        base_selector: "div.listing".into(),
        range: ScrapeRange::new(from, to).unwrap(),
        selectors,
        renderer: Renderer::WebDriver,
        webdriver_url: String::new(),
        headless: true,
        output_path: "unused.csv".into(),
        database_url: None,
        extras: BTreeMap::new(),
    }
}

fn page(n: u32) -> String {
    format!("https://homes.example/list?page={n}")
}

#[tokio::test]
async fn visits_every_page_once_in_ascending_order() {
    let config = config(3, 6, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 1,
        ..Default::default()
    };
    let mut channel = ScriptedChannel::default();

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut channel)
        .await;

    assert_eq!(surface.visited, vec![page(3), page(4), page(5), page(6)]);
    assert_eq!(dataset.len(), 4);
    assert!(surface.closed);
    assert_eq!(channel.reads(), 0);
}

#[tokio::test]
async fn two_pages_of_three_items_give_six_records() {
    let config = config(1, 2, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 3,
        ..Default::default()
    };

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut ScriptedChannel::default())
        .await;

    assert_eq!(dataset.len(), 6);
    let titles: Vec<&str> = dataset
        .records()
        .iter()
        .map(|r| r.get("title").unwrap())
        .collect();
    assert_eq!(titles[0], format!("Item 0 of {}", page(1)));
    assert_eq!(titles[5], format!("Item 2 of {}", page(2)));
}

#[tokio::test]
async fn failed_navigation_skips_only_that_page() {
    let config = config(1, 3, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 2,
        failing: HashSet::from([page(2)]),
        ..Default::default()
    };

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut ScriptedChannel::default())
        .await;

    assert_eq!(surface.visited.len(), 3);
    assert_eq!(dataset.len(), 4);
    assert!(
        dataset
            .records()
            .iter()
            .all(|r| !r.get("title").unwrap().contains("page=2"))
    );
    assert!(surface.closed);
}

#[tokio::test]
async fn scroll_failure_still_extracts_every_item() {
    let config = config(1, 1, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 3,
        scroll_height: 5000,
        scroll_fails: true,
        ..Default::default()
    };

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut ScriptedChannel::default())
        .await;

    assert_eq!(surface.scrolls.len(), 1);
    assert_eq!(dataset.len(), 3);
    assert_eq!(
        dataset.records()[2].get("title"),
        Some("Item 2 of https://homes.example/list?page=1")
    );
}

#[tokio::test]
async fn query_error_drops_that_page_and_the_next_is_still_scraped() {
    let config = config(1, 3, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 2,
        query_fails_on: HashSet::from([page(2)]),
        ..Default::default()
    };
    let mut channel = ScriptedChannel::default();

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut channel)
        .await;

    assert_eq!(surface.visited, vec![page(1), page(2), page(3)]);
    assert_eq!(surface.base_queries, 3);
    assert_eq!(channel.reads(), 0);
    assert_eq!(dataset.len(), 4);

    let titles: Vec<&str> = dataset
        .records()
        .iter()
        .map(|r| r.get("title").unwrap())
        .collect();
    assert!(titles.iter().all(|t| !t.contains("page=2")));
    assert!(titles[2].ends_with("page=3"));
    assert!(surface.closed);
}

#[tokio::test]
async fn empty_page_waits_for_operator_and_retries() {
    let config = config(1, 1, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 2,
        empty_queries: 2,
        ..Default::default()
    };
    let mut channel = ScriptedChannel::releases(5);

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut channel)
        .await;

    // empty, release, still empty, release again, then items
    assert_eq!(surface.base_queries, 3);
    assert_eq!(channel.reads(), 2);
    assert_eq!(dataset.len(), 2);
}

#[tokio::test]
async fn closed_control_channel_skips_the_page_without_ending_the_run() {
    let config = config(1, 2, vec![SelectorSpec::direct("title", "title")]);
    let mut surface = MockSurface {
        items_per_page: 2,
        empty_queries: usize::MAX,
        ..Default::default()
    };
    let mut channel = ScriptedChannel::releases(1);

    let dataset = ScrapeOrchestrator::new(&config)
        .with_timing(EngineTiming::immediate())
        .run(&mut surface, &mut channel)
        .await;

    assert!(dataset.is_empty());
    assert_eq!(surface.visited.len(), 2);
    assert_eq!(channel.reads(), 3);
    assert!(surface.closed);
}

#[tokio::test]
async fn fields_resolve_independently_and_keep_declaration_order() {
    let specs = vec![
        SelectorSpec::direct("price", "price"),
        SelectorSpec::direct("oops", "broken"),
        SelectorSpec::nested("id", ["dataset", "id"]),
        SelectorSpec::nested("deep", ["dataset", "missing", "deeper"]),
        SelectorSpec::matching("kind", "span.tag", "textContent", ["Sale", "Rent"]),
        SelectorSpec::matching("nope", "span.tag", "textContent", ["Auction"]),
        SelectorSpec::direct_within("heading", "h2", "textContent"),
        SelectorSpec::direct_within("gone", "p.missing", "textContent"),
    ];
    let mut surface = MockSurface {
        items_per_page: 1,
        current: Some(page(1)),
        ..Default::default()
    };
    let items = surface.query_all("div.listing").await.unwrap();

    let extractor = ItemExtractor::new("div.listing", &specs, EngineTiming::immediate());
    let record = extractor.extract_item(&mut surface, &items[0]).await;

    assert_eq!(
        record.names().collect::<Vec<_>>(),
        ["price", "oops", "id", "deep", "kind", "nope", "heading", "gone"]
    );
    assert_eq!(record.get("price"), Some("100"));
    assert_eq!(record.get("oops"), None);
    assert_eq!(record.get("id"), Some("0"));
    assert_eq!(record.get("deep"), None);
    assert_eq!(record.get("kind"), Some("For Sale"));
    assert_eq!(record.get("nope"), None);
    assert_eq!(record.get("heading"), Some("Heading"));
    assert_eq!(record.get("gone"), None);
}

#[tokio::test]
async fn lazy_load_scrolls_until_the_page_height_is_covered() {
    let mut surface = MockSurface {
        scroll_height: 1000,
        ..Default::default()
    };

    let scrolled = trigger_lazy_load(&mut surface, &EngineTiming::immediate())
        .await
        .unwrap();

    assert_eq!(scrolled, 1200);
    assert_eq!(surface.scrolls, vec![300; 4]);
}
