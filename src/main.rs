use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use infiniscroll::cli::Cli;
use infiniscroll::config::Config;
use infiniscroll::tui;

#[tokio::main]
async fn main() {
    // Leave the alternate screen before reporting a panic
    std::panic::set_hook(Box::new(|panic_info| {
        let _ = tui::force_restore_terminal();
        error!("Application panicked: {}", panic_info);
        eprintln!("{}", panic_info);
        std::process::exit(1);
    }));

    if let Err(e) = dotenvy::dotenv() {
        // A missing .env file is fine
        tracing::debug!("No .env file found or error loading it: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli.execute().await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr for headless runs and to a file while the TUI owns the
/// terminal
fn init_logging(cli: &Cli) -> Result<()> {
    let default_level = if cli.debug {
        "infiniscroll=debug"
    } else {
        "infiniscroll=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    if !cli.is_interactive() {
        return tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e));
    }

    let path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| Config::default().log_path());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}
