//! Configurable record extraction from paginated, dynamically rendered pages.
//!
//! A CSV configuration names a URL template, a page range, an item selector
//! and one selector per output field. The engine visits every page on a
//! single surface, waits for an operator whenever a page shows no items,
//! and hands the collected records to a CSV or SQLite sink.

pub mod config;
pub mod database;
pub mod engine;
pub mod harvest;
pub mod models;
pub mod output;
pub mod surface;
pub mod traits;

pub use harvest::Harvester;
pub use models::{Access, RawRecord, ScrapeConfig, ScrapeRange, ScrapedDataset, SelectorSpec};
