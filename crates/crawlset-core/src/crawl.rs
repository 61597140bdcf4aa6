//! Crawl orchestration: the entry page, then each harvested link.

use std::time::Duration;

use tracing::{debug, info, warn};

use crawlset_config::{Config, LinksConfig, PageConfig};

use crate::capture::{CapturePipeline, EnumerationReport};
use crate::collector::{converge, ScrollTuning};
use crate::dataset::DatasetWriter;
use crate::driver::{Browser, PageDriver};
use crate::error::CrawlError;
use crate::harvest::LinkHarvest;
use crate::run_state::{RunGate, RunStateController};

/// Totals for a finished crawl.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Pages navigated successfully.
    pub pages: usize,
    pub links: usize,
    pub images: usize,
    pub failed_targets: usize,
    pub failed_pages: usize,
    pub stopped: bool,
}

impl CrawlReport {
    fn absorb(&mut self, enumeration: &EnumerationReport) {
        self.images += enumeration.images;
        self.failed_targets += enumeration.failed;
        self.stopped |= enumeration.stopped;
    }
}

/// Runs one crawl against a browser.
pub struct Crawler<'a> {
    browser: &'a dyn Browser,
    config: &'a Config,
    gate: RunGate,
    tuning: ScrollTuning,
    pipeline: CapturePipeline,
}

impl<'a> Crawler<'a> {
    pub fn new(browser: &'a dyn Browser, config: &'a Config, controller: &RunStateController) -> Self {
        Self {
            browser,
            config,
            gate: controller.gate(),
            tuning: ScrollTuning::from(&config.scroll),
            pipeline: CapturePipeline::from_config(config),
        }
    }

    pub fn dataset(&self) -> &DatasetWriter {
        self.pipeline.dataset()
    }

    /// The dataset built so far, complete or not.
    pub fn into_dataset(self) -> DatasetWriter {
        self.pipeline.into_dataset()
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.browser.navigation_timeout_ms)
    }

    /// Capture the entry page, then every harvested link in order.
    ///
    /// Failures on linked pages are logged and skipped; failing to load the
    /// entry page ends the crawl.
    pub async fn run(&mut self) -> Result<CrawlReport, CrawlError> {
        let config = self.config;
        let entry = config
            .entry_page()
            .ok_or_else(|| CrawlError::Setup("no page configuration for target_url".to_string()))?;
        let links = match &config.links {
            Some(links) => {
                let follow = config.page(&links.follow).ok_or_else(|| {
                    CrawlError::Setup(format!("unknown page label '{}'", links.follow))
                })?;
                Some((links, follow))
            }
            None => None,
        };

        let mut report = CrawlReport::default();
        if self.gate.checkpoint().await.is_stop() {
            report.stopped = true;
            return Ok(report);
        }

        let page = self.browser.open_page().await?;
        let result = self.crawl_entry(page.as_ref(), entry, links, &mut report).await;
        if let Err(e) = self.browser.close_page(page).await {
            debug!("Failed to close entry page: {}", e);
        }
        result?;

        info!(
            "Crawl finished: {} pages, {} images, {} failed targets, {} failed pages{}",
            report.pages,
            report.images,
            report.failed_targets,
            report.failed_pages,
            if report.stopped { " (stopped)" } else { "" }
        );
        Ok(report)
    }

    async fn crawl_entry(
        &mut self,
        page: &dyn PageDriver,
        entry: &PageConfig,
        links: Option<(&LinksConfig, &PageConfig)>,
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        info!("Opening {}", self.config.target_url);
        page.navigate(&self.config.target_url, self.navigation_timeout())
            .await?;
        report.pages += 1;

        let enumeration = self
            .pipeline
            .enumerate_targets(page, &mut self.gate, entry, &self.tuning)
            .await?;
        report.absorb(&enumeration);

        let Some((links, follow)) = links else {
            return Ok(());
        };
        if report.stopped {
            return Ok(());
        }

        let mut harvest = LinkHarvest::from_config(links, entry.include_iframes)
            .map_err(|e| CrawlError::Setup(format!("invalid comments_pattern: {}", e)))?;
        let session = converge(page, &mut self.gate, &mut harvest, &self.tuning, links.max_links).await?;
        report.links = session.items.len();
        report.stopped |= session.stopped;
        info!("{} links to follow", session.items.len());

        for url in &session.items {
            if report.stopped || self.gate.checkpoint().await.is_stop() {
                report.stopped = true;
                break;
            }
            self.visit(url, follow, report).await;
        }
        Ok(())
    }

    /// Open `url` in a fresh page and capture it with `config`.
    async fn visit(&mut self, url: &str, config: &PageConfig, report: &mut CrawlReport) {
        let page = match self.browser.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("Could not open a page for {}: {}", url, e);
                report.failed_pages += 1;
                return;
            }
        };

        info!("Visiting {}", url);
        match page.navigate(url, self.navigation_timeout()).await {
            Ok(()) => {
                report.pages += 1;
                match self
                    .pipeline
                    .enumerate_targets(page.as_ref(), &mut self.gate, config, &self.tuning)
                    .await
                {
                    Ok(enumeration) => report.absorb(&enumeration),
                    Err(e) => {
                        warn!("Capturing {} failed: {}", url, e);
                        report.failed_pages += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                report.failed_pages += 1;
            }
        }

        if let Err(e) = self.browser.close_page(page).await {
            debug!("Failed to close page for {}: {}", url, e);
        }
    }
}

#[cfg(test)]
#[path = "crawl_tests.rs"]
mod tests;
