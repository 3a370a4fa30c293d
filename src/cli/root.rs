use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};

use super::simulate::SimulateCommand;
use crate::config::{Config, ConfigOverrides};
use crate::tui;

/// Bidirectional infinite scroll over a paginated feed
#[derive(Parser, Debug)]
#[command(
    name = "infiniscroll",
    version,
    about = "Bidirectional infinite scroll over a paginated feed",
    long_about = r#"Scrolls a virtualized list backed by a cursor-paginated data source.
Pages are fetched as either edge comes into view and evicted once too many
are resident, while the scroll position stays anchored to what is on screen.

Examples:
  infiniscroll                              # Start interactive mode
  infiniscroll --latency-ms 300 --end 120   # Faster, finite feed
  infiniscroll simulate --scroll=-40,-40    # Headless scripted session"#
)]
pub struct Cli {
    /// Records requested per fetch
    #[arg(long = "page-size", global = true)]
    pub page_size: Option<usize>,

    /// Pages kept in memory before eviction
    #[arg(long = "max-pages", global = true)]
    pub max_pages: Option<usize>,

    /// Simulated fetch latency in milliseconds
    #[arg(long = "latency-ms", global = true)]
    pub latency_ms: Option<u64>,

    /// Rows rendered beyond each edge of the viewport
    #[arg(long = "overscan", global = true)]
    pub overscan: Option<usize>,

    /// Last record id plus one; the feed is endless when omitted
    #[arg(long = "end", global = true)]
    pub end: Option<u64>,

    /// Probability that a fetch fails
    #[arg(long = "failure-rate", global = true)]
    pub failure_rate: Option<f64>,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Write logs to this file instead of the default location
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted scroll session without a terminal UI
    Simulate(SimulateCommand),
}

impl Cli {
    /// Whether the command takes over the terminal
    pub fn is_interactive(&self) -> bool {
        self.command.is_none()
    }

    /// Settings given on the command line
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            page_size: self.page_size,
            max_resident_pages: self.max_pages,
            latency_ms: self.latency_ms,
            overscan: self.overscan,
            end_of_feed: self.end,
            failure_rate: self.failure_rate,
            ..ConfigOverrides::default()
        }
    }

    pub async fn execute(self) -> Result<()> {
        if self.debug {
            debug!("Debug logging enabled");
        }

        let config = Config::init(self.overrides()).await?;
        config.validate()?;
        debug!(?config, "Configuration initialized");

        match self.command {
            Some(Commands::Simulate(simulate)) => simulate.execute(&config).await,
            None => {
                info!("Starting interactive mode");
                tui::run(&config).await?;
                info!("Application finished");
                Ok(())
            }
        }
    }
}
