//! Traits at the seams of the engine: the page being scraped, the operator
//! channel and the output sinks

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::ScrapedDataset;

/// A navigable, queryable page.
///
/// The engine owns exactly one surface for a whole run and never issues two
/// calls on it at the same time.
#[async_trait]
pub trait PageSurface: Send {
    /// Handle to one element of the currently loaded document
    type Element: Send + Sync;

    /// Load `url` in place of the current document
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Wait until the page has stopped loading resources
    async fn wait_for_idle(&mut self) -> Result<()>;

    /// Scroll the viewport down by `distance` pixels
    ///
    /// # Returns
    /// * `Result<u64>` - The scrollable height of the document after scrolling
    async fn scroll_by(&mut self, distance: u32) -> Result<u64>;

    /// All elements of the document matching `selector`, in document order
    async fn query_all(&mut self, selector: &str) -> Result<Vec<Self::Element>>;

    /// All descendants of `element` matching `selector`, in document order
    async fn query_within(
        &mut self,
        element: &Self::Element,
        selector: &str,
    ) -> Result<Vec<Self::Element>>;

    /// Read a property path off `element`'s node.
    ///
    /// Each segment is read off the result of the previous one. An absent
    /// intermediate value yields `Value::Null` instead of an error.
    async fn read_property(&mut self, element: &Self::Element, path: &[String]) -> Result<Value>;

    /// Release the underlying session
    async fn close(&mut self) -> Result<()>;
}

/// Line-oriented operator input used to release the intervention gate
#[async_trait]
pub trait ControlChannel: Send {
    /// Wait for the next line. `Ok(None)` means the channel reached its end.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;
}

/// Destination for the records of a finished run
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Short human readable description used in logs
    fn describe(&self) -> String;

    /// Persist `dataset`, projecting every record onto `fields`
    async fn save(&self, fields: &[String], dataset: &ScrapedDataset) -> Result<()>;
}
