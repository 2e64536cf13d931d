//! CLI entry point for labwire.

use anyhow::{Context, Result};
use clap::Parser;
use labwire::cli::{self, Cli};
use labwire::config::AppConfig;
use labwire::logging::{self, TracingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    let tracing_config = TracingConfig::from_app_config(&config).map_err(anyhow::Error::msg)?;
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    cli::run(cli.command, &config).await
}
