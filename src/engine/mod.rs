//! Scrape engine: walks the configured page range on one surface and
//! collects every record.

pub mod extract;
pub mod gate;
pub mod resolver;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::models::{RawRecord, ScrapeConfig, ScrapedDataset};
use crate::traits::{ControlChannel, PageSurface};

pub use extract::{ItemExtractor, trigger_lazy_load};
pub use gate::{GateError, GateState, InterventionGate, ScriptedChannel, StdinChannel};
pub use resolver::FieldError;

/// Delays and distances used while driving the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    /// Pause after every page, successful or not
    pub page_delay: Duration,
    /// Pixels scrolled per lazy-load tick
    pub scroll_step: u32,
    pub scroll_interval: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(1000),
            scroll_step: 300,
            scroll_interval: Duration::from_millis(100),
        }
    }
}

impl EngineTiming {
    /// No waiting at all, for fixture surfaces and tests
    pub fn immediate() -> Self {
        Self {
            page_delay: Duration::ZERO,
            scroll_step: 300,
            scroll_interval: Duration::ZERO,
        }
    }
}

/// Drives the page range strictly in ascending order on a single surface
pub struct ScrapeOrchestrator<'a> {
    config: &'a ScrapeConfig,
    timing: EngineTiming,
}

impl<'a> ScrapeOrchestrator<'a> {
    pub fn new(config: &'a ScrapeConfig) -> Self {
        Self {
            config,
            timing: EngineTiming::default(),
        }
    }

    #[must_use]
    pub fn with_timing(mut self, timing: EngineTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Scrape every page of the range and release `surface` afterwards.
    ///
    /// Page-level failures are logged and contribute no records; they never
    /// end the run early.
    pub async fn run<S, C>(&self, surface: &mut S, channel: &mut C) -> ScrapedDataset
    where
        S: PageSurface,
        C: ControlChannel + ?Sized,
    {
        let config = self.config;
        let extractor = ItemExtractor::new(&config.base_selector, &config.selectors, self.timing);
        let mut dataset = ScrapedDataset::new();

        info!(
            "Scraping {} pages ({}..={}) with {} selectors",
            config.range.page_count(),
            config.range.from,
            config.range.to,
            config.selectors.len()
        );

        for page in config.range.pages() {
            let url = config.page_url(page);
            info!("Scraping page {}: {}", page, url);

            match self.scrape_page(surface, channel, &extractor, &url).await {
                Ok(records) => {
                    info!("Page {} yielded {} records", page, records.len());
                    dataset.extend_page(records);
                }
                Err(e) if e.downcast_ref::<GateError>().is_some() => {
                    error!("Gave up waiting for the operator on {}, skipping page: {}", url, e);
                }
                Err(e) => {
                    warn!("Skipping page {} ({}): {:#}", page, url, e);
                }
            }

            tokio::time::sleep(self.timing.page_delay).await;
        }

        if let Err(e) = surface.close().await {
            warn!("Failed to release page surface: {}", e);
        }

        info!("Scraped {} records in total", dataset.len());
        dataset
    }

    async fn scrape_page<S, C>(
        &self,
        surface: &mut S,
        channel: &mut C,
        extractor: &ItemExtractor<'_>,
        url: &str,
    ) -> Result<Vec<RawRecord>>
    where
        S: PageSurface,
        C: ControlChannel + ?Sized,
    {
        surface
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;

        if let Err(e) = surface.wait_for_idle().await {
            warn!("Page {} did not settle, extracting anyway: {}", url, e);
        }

        extractor.extract_page(surface, channel, url).await
    }
}
