use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::Config;
use crate::scroll::{ListSnapshot, ScrollCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One scripted user action
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollStep {
    /// Scroll by this many terminal lines; negative is up
    By(f64),
    /// Jump to the oldest resident row
    Home,
    /// Jump to the newest row
    End,
    /// Re-enter live mode
    Live,
}

impl FromStr for ScrollStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(ScrollStep::Home),
            "end" => Ok(ScrollStep::End),
            "live" => Ok(ScrollStep::Live),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|lines| lines.is_finite())
                .map(ScrollStep::By)
                .ok_or_else(|| {
                    format!("expected a line count, 'home', 'end' or 'live', got {:?}", s)
                }),
        }
    }
}

impl std::fmt::Display for ScrollStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrollStep::By(lines) => write!(f, "scroll {:+}", lines),
            ScrollStep::Home => f.write_str("home"),
            ScrollStep::End => f.write_str("end"),
            ScrollStep::Live => f.write_str("resume live"),
        }
    }
}

/// State after one step of the script
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub fetched: usize,
    pub snapshot: ListSnapshot,
}

/// Run a scripted scroll session without a terminal UI
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// Comma separated steps: line counts (negative scrolls up), home, end, live
    #[arg(long = "scroll", value_delimiter = ',', allow_hyphen_values = true)]
    pub scroll: Vec<ScrollStep>,

    /// Viewport height in terminal lines
    #[arg(long = "viewport", default_value_t = 20)]
    pub viewport: u16,

    /// Fetches allowed after each step
    #[arg(long = "max-fetches", default_value_t = 10)]
    pub max_fetches: usize,

    /// Keep the configured latency instead of answering instantly
    #[arg(long = "realtime")]
    pub realtime: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl SimulateCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        let reports = self.run(config).await;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            OutputFormat::Text => {
                for report in &reports {
                    println!("{}", format_report(report));
                }
            }
        }

        Ok(())
    }

    /// Drive a coordinator through the script and collect a report per step
    pub async fn run(&self, config: &Config) -> Vec<StepReport> {
        let mut config = config.clone();
        if !self.realtime {
            config.latency_ms = 0;
        }
        let source = config.data_source();
        let mut coordinator: ScrollCoordinator<String> = ScrollCoordinator::new(
            config.feed_config(),
            config.virtualizer_options(self.viewport),
        );

        info!(steps = self.scroll.len(), "starting simulation");
        let mut reports = Vec::with_capacity(self.scroll.len() + 1);

        let fetched = coordinator.settle(&source, self.max_fetches).await;
        reports.push(StepReport {
            step: "initial load".to_string(),
            fetched,
            snapshot: coordinator.snapshot(),
        });

        for step in &self.scroll {
            debug!(%step, "applying step");
            match *step {
                ScrollStep::By(lines) => coordinator.scroll_by(lines),
                ScrollStep::Home => coordinator.scroll_to_offset(f64::NEG_INFINITY),
                ScrollStep::End => coordinator.scroll_to_offset(f64::INFINITY),
                ScrollStep::Live => coordinator.resume_live(),
            }
            let fetched = coordinator.settle(&source, self.max_fetches).await;
            reports.push(StepReport {
                step: step.to_string(),
                fetched,
                snapshot: coordinator.snapshot(),
            });
        }

        reports
    }
}

fn format_report(report: &StepReport) -> String {
    let snapshot = &report.snapshot;
    let ids = snapshot
        .resident_ids
        .as_ref()
        .map_or("-".to_string(), |ids| format!("{}..={}", ids.start(), ids.end()));
    let visible = snapshot
        .visible
        .as_ref()
        .map_or("-".to_string(), |rows| format!("{}..={}", rows.start(), rows.end()));

    let mut line = format!(
        "{:<14} fetched {:>2} | ids {} | pages {} | slots {} | visible {} | offset {:.0}/{:.0} | {}",
        report.step,
        report.fetched,
        ids,
        snapshot.resident_pages,
        snapshot.count,
        visible,
        snapshot.scroll_offset,
        snapshot.total_size,
        if snapshot.follow_live { "live" } else { "paused" },
    );
    if let Some(error) = &snapshot.last_error {
        line.push_str(&format!(" | last error: {}", error));
    }
    line
}
