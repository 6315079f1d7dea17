//! Browser-backed page surface speaking the WebDriver protocol through
//! `fantoccini`. Expects a running Chromedriver (or compatible) endpoint.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::traits::PageSurface;

const IDLE_POLL: Duration = Duration::from_millis(250);
const IDLE_QUIET: Duration = Duration::from_millis(500);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads `arguments[1]` (a property path) off `arguments[0]`, yielding null
/// as soon as a segment is missing. Nodes are returned as markup and other
/// objects as plain JSON.
const READ_PATH_SCRIPT: &str = r"
const [node, path] = arguments;
const value = path.reduce((o, k) => (o === null || o === undefined) ? undefined : o[k], node);
if (value === undefined || value === null) return null;
if (value instanceof Node) return value.outerHTML ?? value.textContent;
if (typeof value === 'object') {
  try { return JSON.parse(JSON.stringify(value)); } catch (_) { return String(value); }
}
return value;
";

const SCROLL_SCRIPT: &str = r"
window.scrollBy(0, arguments[0]);
return document.body ? document.body.scrollHeight : 0;
";

const LOAD_STATE_SCRIPT: &str = r"
let resources = 0;
try { resources = performance.getEntriesByType('resource').length; } catch (_) {}
return [document.readyState, resources];
";

pub struct WebDriverSurface {
    client: Client,
    closed: bool,
}

impl WebDriverSurface {
    /// Open a new browser session on the WebDriver endpoint at `webdriver_url`.
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut args = vec!["--window-size=1366,900", "--disable-dev-shm-usage"];
        if headless {
            args.push("--headless=new");
            args.push("--disable-gpu");
        }

        let mut caps = Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .with_context(|| format!("failed to open a browser session on {webdriver_url}"))?;

        info!("Browser session started on {} (headless: {})", webdriver_url, headless);
        Ok(Self {
            client,
            closed: false,
        })
    }
}

#[async_trait]
impl PageSurface for WebDriverSurface {
    type Element = Element;

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    /// Ready state `complete` and no new resource entries for a short quiet
    /// period, the closest WebDriver gets to "network idle".
    async fn wait_for_idle(&mut self) -> Result<()> {
        let start = Instant::now();
        let mut last_count = None;
        let mut quiet = Duration::ZERO;

        while start.elapsed() < IDLE_TIMEOUT {
            tokio::time::sleep(IDLE_POLL).await;

            let state = self.client.execute(LOAD_STATE_SCRIPT, vec![]).await?;
            let ready = state.get(0).and_then(Value::as_str) == Some("complete");
            let count = state.get(1).and_then(Value::as_u64).unwrap_or(0);

            if ready && last_count == Some(count) {
                quiet += IDLE_POLL;
                if quiet >= IDLE_QUIET {
                    debug!("Page idle after {}ms with {} resources", start.elapsed().as_millis(), count);
                    return Ok(());
                }
            } else {
                quiet = Duration::ZERO;
            }
            last_count = Some(count);
        }

        Err(anyhow!("page still loading after {}s", IDLE_TIMEOUT.as_secs()))
    }

    async fn scroll_by(&mut self, distance: u32) -> Result<u64> {
        let height = self
            .client
            .execute(SCROLL_SCRIPT, vec![json!(distance)])
            .await?;
        Ok(height.as_u64().unwrap_or(0))
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<Element>> {
        Ok(self.client.find_all(Locator::Css(selector)).await?)
    }

    async fn query_within(&mut self, element: &Element, selector: &str) -> Result<Vec<Element>> {
        Ok(element.find_all(Locator::Css(selector)).await?)
    }

    async fn read_property(&mut self, element: &Element, path: &[String]) -> Result<Value> {
        let args = vec![serde_json::to_value(element)?, json!(path)];
        Ok(self.client.execute(READ_PATH_SCRIPT, args).await?)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.client.clone().close().await {
            warn!("Browser session did not close cleanly: {}", e);
            return Err(e.into());
        }
        info!("Browser session closed");
        Ok(())
    }
}
