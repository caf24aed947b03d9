mod archive;
mod config;
mod dashboard;
mod locator;
mod logs;
mod report;
mod server;
mod timeline;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, SessionArgs, Settings};
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sessionview")]
#[command(version)]
#[command(about = "Fetch a recorded device session and browse its screenshots and logs on one timeline")]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    info!("sessionview {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(cli.session.config.as_deref())?;
    let settings = Settings::resolve(cli.session, config)?;

    let log_path = prepare_session(&settings)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(server::run_server(server::ServerConfig {
        log_path,
        port: settings.port,
    }))
}

/// Download, extract and render the session. Returns the log file the
/// server answers range queries from.
fn prepare_session(settings: &Settings) -> Result<PathBuf> {
    // Look up the session anchor before downloading anything
    let client = dashboard::DashboardClient::new(settings)?;
    let session_anchor = client.lookup_session(&settings.session_id)?;

    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    let bundle = client.download_export(&settings.session_id, &working_dir)?;

    // Extract, then drop the downloaded bundle
    let session_dir = archive::unpack_export(&bundle, &working_dir.join(settings.session_dir()))?;
    if let Err(e) = std::fs::remove_file(&bundle) {
        warn!("Failed to remove {}: {}", bundle.display(), e);
    }
    info!("Session extracted to {}", session_dir.display());

    // Locate artifacts
    let log_path = locator::find_log_file(&session_dir)?;
    info!("Using log file {}", log_path.display());

    let screenshots = locator::find_screenshots(&session_dir)?;
    info!("Found {} screenshots", screenshots.len());

    // Build the report from the first page of log lines
    let entries = logs::query_logs(&log_path, logs::INITIAL_RANGE)
        .with_context(|| format!("Failed to read log file: {}", log_path.display()))?;

    let report = report::assemble(
        &settings.session_id,
        session_anchor,
        screenshots,
        entries,
        settings.orientation,
    )?;
    let output_path = report::write_report(&report, &settings.output, settings.port)?;

    println!("Please open {} in your browser", output_path.display());

    Ok(log_path)
}
