//! crawlset - annotated screenshot dataset collector.
//!
//! Drives a Chrome instance through a dynamically rendering site, captures
//! configured elements with their annotations outlined, and writes one COCO
//! dataset per run.

mod cli;
mod signal;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crawlset_browser::{ChromeBrowser, ChromeConfig};
use crawlset_config::{ConfigLoader, ConfigValidator};
use crawlset_core::{Crawler, RunStateController};
use crawlset_overlay::{parse_subset, OverlayStyle};

use cli::{Cli, Commands};

/// Console logging, plus a daily-rolling file under `log_dir` when given.
fn init_tracing(log_dir: Option<&Path>) -> Result<()> {
    let file_layer = match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("crawlset")
                .filename_suffix("log")
                .max_log_files(30)
                .build(log_dir)
                .context("Failed to create log file appender")?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes on drop; keep it for the life of the process.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        None | Some(Commands::Run) => run_crawl(&cli.config).await,
        Some(Commands::Validate) => validate_config(&cli.config),
        Some(Commands::Visualize {
            folder,
            save,
            subset,
            line_width,
        }) => run_visualize(folder, save, subset, line_width),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run one crawl and write its dataset.
async fn run_crawl(config_path: &Path) -> Result<ExitCode> {
    let config = ConfigLoader::load_validated(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    init_tracing(Some(&config.output_dir.join("logs")))?;

    info!("Starting crawlset v{}", env!("CARGO_PKG_VERSION"));
    info!("Target: {}", config.target_url);
    info!("Output: {}", config.output_dir.display());

    let controller = RunStateController::new();
    signal::setup_os_signals(&controller).context("Failed to install signal handlers")?;
    signal::spawn_keyboard(controller.clone()).context("Failed to start keyboard listener")?;

    if config.autostart {
        controller.start();
    } else {
        info!("Waiting for start: type 's' and Enter (p = pause/resume, q = stop)");
    }

    let browser = ChromeBrowser::connect(ChromeConfig::from(&config.browser))
        .await
        .context("Failed to connect to Chrome")?;

    let mut crawler = Crawler::new(&browser, &config, &controller);
    let outcome = crawler.run().await;
    let dataset = crawler.into_dataset();

    // Written even after a stop or a failed crawl so images on disk stay
    // described.
    let dataset_path = config.dataset_path();
    let written = dataset.write(&dataset_path);
    browser.shutdown().await;

    written.with_context(|| format!("Failed to write dataset {}", dataset_path.display()))?;
    info!(
        "Wrote {} ({} images, {} annotations)",
        dataset_path.display(),
        dataset.image_count(),
        dataset.annotation_count()
    );

    let report = outcome.context("Crawl failed")?;
    if report.stopped {
        info!("Run stopped by request");
    }
    Ok(ExitCode::SUCCESS)
}

/// Print validation results; fail on any error.
fn validate_config(config_path: &Path) -> Result<ExitCode> {
    let config = ConfigLoader::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let result = ConfigValidator::validate(&config);

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if result.is_valid() {
        println!(
            "{} is valid ({} page{}, {} warning{})",
            config_path.display(),
            config.pages.len(),
            if config.pages.len() == 1 { "" } else { "s" },
            result.warnings.len(),
            if result.warnings.len() == 1 { "" } else { "s" }
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} has {} error{}",
            config_path.display(),
            result.errors.len(),
            if result.errors.len() == 1 { "" } else { "s" }
        );
        Ok(ExitCode::FAILURE)
    }
}

/// Render overlays for a dataset folder.
fn run_visualize(
    folder: PathBuf,
    save: Option<PathBuf>,
    subset: Option<String>,
    line_width: Option<u32>,
) -> Result<ExitCode> {
    init_tracing(None)?;

    let save_dir = save.unwrap_or_else(|| folder.join("overlays"));
    let subset = subset.as_deref().map(parse_subset);
    let style = OverlayStyle { line_width };

    let report = crawlset_overlay::visualize(&folder, &save_dir, subset.as_ref(), style)
        .with_context(|| format!("Failed to visualize {}", folder.display()))?;

    if !report.processed.is_empty() {
        info!(
            "Wrote {} overlay{} to {}",
            report.processed.len(),
            if report.processed.len() == 1 { "" } else { "s" },
            save_dir.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}
