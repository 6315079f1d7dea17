use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paged_harvest::Harvester;
use paged_harvest::config::Overrides;
use paged_harvest::engine::StdinChannel;

/// Extract records from a range of pages described by a CSV config
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration table
    config: PathBuf,

    /// Write CSV output here instead of the configured path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Store records in this SQLite database instead of a CSV file
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,

    /// WebDriver endpoint to open the browser session on
    #[arg(long, env = "WEBDRIVER_URL")]
    webdriver: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let overrides = Overrides {
        output: cli.output.map(|p| p.display().to_string()),
        database: cli.database,
        webdriver: cli.webdriver,
        headless: cli.headless,
    };
    let config = paged_harvest::config::load_with(&cli.config, &overrides)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;

    info!(
        "Starting harvest of {} with {} fields",
        config.base_url,
        config.selectors.len()
    );

    let harvester = Harvester::new(config);
    let dataset = harvester.scrape(&mut StdinChannel::new()).await?;
    harvester.save(&dataset).await?;

    Ok(())
}
