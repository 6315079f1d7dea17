use anyhow::{Context, Result};
use tracing::info;

use crate::database::SqlSink;
use crate::engine::{EngineTiming, ScrapeOrchestrator};
use crate::models::{Renderer, ScrapeConfig, ScrapedDataset};
use crate::output::CsvSink;
use crate::surface::{StaticSurface, WebDriverSurface};
use crate::traits::{ControlChannel, OutputSink};

/// One complete run: acquire a surface, scrape the range, hand the records
/// to the configured sink.
pub struct Harvester {
    config: ScrapeConfig,
    timing: EngineTiming,
}

impl Harvester {
    pub fn new(config: ScrapeConfig) -> Self {
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

    /// Scrape the whole range. Fails only when no page surface can be
    /// acquired; everything below that degrades to fewer records.
    pub async fn scrape<C>(&self, channel: &mut C) -> Result<ScrapedDataset>
    where
        C: ControlChannel + ?Sized,
    {
        let orchestrator = ScrapeOrchestrator::new(&self.config).with_timing(self.timing);

        let dataset = match self.config.renderer {
            Renderer::WebDriver => {
                let mut surface =
                    WebDriverSurface::connect(&self.config.webdriver_url, self.config.headless)
                        .await?;
                orchestrator.run(&mut surface, channel).await
            }
            Renderer::Static => {
                let mut surface =
                    StaticSurface::new().context("failed to build the HTTP client")?;
                orchestrator.run(&mut surface, channel).await
            }
        };

        Ok(dataset)
    }

    /// The sink records go to: the database when one is configured,
    /// otherwise the CSV file.
    pub async fn sink(&self) -> Result<Box<dyn OutputSink>> {
        Ok(match &self.config.database_url {
            Some(url) => Box::new(SqlSink::connect(url).await?),
            None => Box::new(CsvSink::new(&self.config.output_path)),
        })
    }

    pub async fn save(&self, dataset: &ScrapedDataset) -> Result<()> {
        let sink = self.sink().await?;
        info!("Saving {} records to {}", dataset.len(), sink.describe());
        sink.save(&self.config.field_names(), dataset)
            .await
            .with_context(|| format!("failed to save results to {}", sink.describe()))
    }
}
