//! Per-page procedure: lazy-load, item query behind the intervention gate,
//! then one record per item element

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::engine::EngineTiming;
use crate::engine::gate::InterventionGate;
use crate::engine::resolver;
use crate::models::{RawRecord, SelectorSpec};
use crate::traits::{ControlChannel, PageSurface};

/// Scroll until the accumulated distance reaches the document height so
/// content that loads on scroll gets rendered.
///
/// # Returns
/// * `Result<u64>` - Total distance scrolled
pub async fn trigger_lazy_load<S: PageSurface>(surface: &mut S, timing: &EngineTiming) -> Result<u64> {
    let step = timing.scroll_step.max(1);
    let mut scrolled = 0u64;

    loop {
        let height = surface.scroll_by(step).await?;
        scrolled += u64::from(step);
        debug!("Lazy-load scrolled {}px of {}px", scrolled, height);

        if scrolled >= height {
            return Ok(scrolled);
        }
        tokio::time::sleep(timing.scroll_interval).await;
    }
}

/// Builds records from the item elements of the current page
#[derive(Debug, Clone, Copy)]
pub struct ItemExtractor<'a> {
    base_selector: &'a str,
    specs: &'a [SelectorSpec],
    timing: EngineTiming,
}

impl<'a> ItemExtractor<'a> {
    pub fn new(base_selector: &'a str, specs: &'a [SelectorSpec], timing: EngineTiming) -> Self {
        Self {
            base_selector,
            specs,
            timing,
        }
    }

    /// Extract every item of the page currently loaded in `surface`.
    ///
    /// Blocks on the intervention gate for as long as the base query comes
    /// back empty. Fails only when the query itself errors or the control
    /// channel closes.
    pub async fn extract_page<S, C>(
        &self,
        surface: &mut S,
        channel: &mut C,
        url: &str,
    ) -> Result<Vec<RawRecord>>
    where
        S: PageSurface,
        C: ControlChannel + ?Sized,
    {
        if let Err(e) = trigger_lazy_load(surface, &self.timing).await {
            warn!("Lazy-load scrolling failed on {}, extracting what has rendered: {}", url, e);
        }

        let items = loop {
            let items = surface
                .query_all(self.base_selector)
                .await
                .with_context(|| format!("failed to query `{}`", self.base_selector))?;
            if !items.is_empty() {
                break items;
            }
            InterventionGate::enter().wait(channel, url).await?;
        };

        info!("Found {} item elements on {}", items.len(), url);

        let mut records = Vec::with_capacity(items.len());
        for item in &items {
            records.push(self.extract_item(surface, item).await);
        }
        Ok(records)
    }

    /// One record per item, fields in declaration order. Absent fields are
    /// kept, never filtered.
    pub async fn extract_item<S: PageSurface>(&self, surface: &mut S, item: &S::Element) -> RawRecord {
        let mut record = RawRecord::new();
        for spec in self.specs {
            let value = resolver::resolve(surface, item, spec).await;
            record.push(spec.name.clone(), value);
        }
        record
    }
}
