use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::feed::{DelayedSource, FeedConfig};
use crate::virtualizer::VirtualizerOptions;

/// Prefix of every environment variable read by [`Config::load_from_env`]
const ENV_PREFIX: &str = "INFINISCROLL_";

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Records requested per fetch
    pub page_size: usize,

    /// Cursor of the first forward fetch
    pub initial_cursor: u64,

    /// Pages kept resident before eviction
    pub max_resident_pages: usize,

    /// Estimated height of one row, in terminal lines
    pub item_size: f64,

    /// Rows materialized beyond each edge of the viewport
    pub overscan: usize,

    /// Simulated fetch latency of the stub source
    pub latency_ms: u64,

    /// Exclusive upper bound on record ids; the feed is endless when unset
    pub end_of_feed: Option<u64>,

    /// Probability that a stub fetch fails
    pub failure_rate: f64,

    /// Redraw interval of the interactive mode
    pub tick_rate_ms: u64,

    /// Directory for the log file
    pub data_dir: PathBuf,
}

/// Partial configuration: only the fields a source actually sets
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub page_size: Option<usize>,
    pub initial_cursor: Option<u64>,
    pub max_resident_pages: Option<usize>,
    pub item_size: Option<f64>,
    pub overscan: Option<usize>,
    pub latency_ms: Option<u64>,
    pub end_of_feed: Option<u64>,
    pub failure_rate: Option<f64>,
    pub tick_rate_ms: Option<u64>,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 10,
            initial_cursor: 0,
            max_resident_pages: 3,
            item_size: 1.0,
            overscan: 20,
            latency_ms: 2000,
            end_of_feed: None,
            failure_rate: 0.0,
            tick_rate_ms: 100,
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Build the configuration from defaults, the config file, the
    /// environment and finally the command line
    pub async fn init(cli: ConfigOverrides) -> Result<Self> {
        debug!("Initializing configuration");

        let mut config = Self::default();

        if let Some(file_config) = Self::load_from_file().await? {
            config.merge_with(file_config);
        }

        config.merge_with(Self::load_from_env(|key| std::env::var(key).ok()));
        config.merge_with(cli);

        Ok(config)
    }

    /// Read `INFINISCROLL_*` variables through `lookup`. Unparsable values
    /// are skipped with a warning.
    pub fn load_from_env(lookup: impl Fn(&str) -> Option<String>) -> ConfigOverrides {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            let key = format!("{}{}", ENV_PREFIX, name);
            let raw = lookup(&key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid value for {}: {:?}", key, raw);
                    None
                }
            }
        }

        ConfigOverrides {
            page_size: parse(&lookup, "PAGE_SIZE"),
            initial_cursor: parse(&lookup, "INITIAL_CURSOR"),
            max_resident_pages: parse(&lookup, "MAX_PAGES"),
            item_size: parse(&lookup, "ITEM_SIZE"),
            overscan: parse(&lookup, "OVERSCAN"),
            latency_ms: parse(&lookup, "LATENCY_MS"),
            end_of_feed: parse(&lookup, "END"),
            failure_rate: parse(&lookup, "FAILURE_RATE"),
            tick_rate_ms: parse(&lookup, "TICK_RATE_MS"),
            data_dir: lookup(&format!("{}DATA_DIR", ENV_PREFIX)).map(PathBuf::from),
        }
    }

    /// Load the first configuration file found.
    ///
    /// Lookup order:
    /// 1. ./.infiniscroll.json
    /// 2. ./infiniscroll.json
    /// 3. $CONFIG_DIR/infiniscroll/infiniscroll.json
    pub async fn load_from_file() -> Result<Option<ConfigOverrides>> {
        let mut config_paths = vec![
            PathBuf::from("./.infiniscroll.json"),
            PathBuf::from("./infiniscroll.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join("infiniscroll").join("infiniscroll.json"));
        }

        for path in config_paths {
            if path.exists() {
                return Self::load_from_path(&path).await.map(Some);
            }
        }

        Ok(None)
    }

    /// Parse one configuration file
    pub async fn load_from_path(path: &Path) -> Result<ConfigOverrides> {
        debug!("Loading configuration from: {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Apply every field the overrides set
    pub fn merge_with(&mut self, other: ConfigOverrides) {
        if let Some(page_size) = other.page_size {
            self.page_size = page_size;
        }
        if let Some(initial_cursor) = other.initial_cursor {
            self.initial_cursor = initial_cursor;
        }
        if let Some(max_resident_pages) = other.max_resident_pages {
            self.max_resident_pages = max_resident_pages;
        }
        if let Some(item_size) = other.item_size {
            self.item_size = item_size;
        }
        if let Some(overscan) = other.overscan {
            self.overscan = overscan;
        }
        if let Some(latency_ms) = other.latency_ms {
            self.latency_ms = latency_ms;
        }
        if other.end_of_feed.is_some() {
            self.end_of_feed = other.end_of_feed;
        }
        if let Some(failure_rate) = other.failure_rate {
            self.failure_rate = failure_rate;
        }
        if let Some(tick_rate_ms) = other.tick_rate_ms {
            self.tick_rate_ms = tick_rate_ms;
        }
        if let Some(data_dir) = other.data_dir {
            self.data_dir = data_dir;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be greater than 0");
        }

        if self.max_resident_pages == 0 {
            bail!("max_resident_pages must be greater than 0");
        }

        if !self.item_size.is_finite() || self.item_size <= 0.0 {
            bail!("item_size must be a positive number");
        }

        if !(0.0..=1.0).contains(&self.failure_rate) {
            bail!("failure_rate must be between 0.0 and 1.0");
        }

        if self.tick_rate_ms == 0 {
            bail!("tick_rate_ms must be greater than 0");
        }

        if let Some(end) = self.end_of_feed {
            if end <= self.initial_cursor {
                bail!(
                    "end_of_feed ({}) must be greater than initial_cursor ({})",
                    end,
                    self.initial_cursor
                );
            }
        }

        Ok(())
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            page_size: self.page_size,
            initial_cursor: self.initial_cursor,
            max_resident_pages: self.max_resident_pages,
        }
    }

    /// Virtualizer options for a viewport of `viewport_rows` terminal lines
    pub fn virtualizer_options(&self, viewport_rows: u16) -> VirtualizerOptions {
        VirtualizerOptions::default()
            .with_viewport_size(f64::from(viewport_rows))
            .with_estimate_size(self.item_size)
            .with_overscan(self.overscan)
    }

    pub fn data_source(&self) -> DelayedSource {
        DelayedSource::new(Duration::from_millis(self.latency_ms))
            .with_end(self.end_of_feed)
            .with_failure_rate(self.failure_rate)
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("infiniscroll.log")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("infiniscroll"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
