//! Annotation and capture pipeline.
//!
//! A capture cycle outlines every visible element of the configured
//! categories, measures them, screenshots the viewport and records the
//! boxes in the dataset. Pages are left as they were found: original inline
//! outlines come back from a side-table and the category tag is removed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crawlset_config::{AnnotationSpec, Config, InteractionConfig, PageConfig};

use crate::collector::{converge, Harvest, ScrollTuning};
use crate::dataset::{Category, CategoryTable, DatasetInfo, DatasetWriter};
use crate::driver::{release_all, ElementHandle, HandleScope, NodeKey, PageDriver};
use crate::error::CaptureError;
use crate::harvest::TargetHarvest;
use crate::query::DeepQuery;
use crate::run_state::RunGate;

/// Attribute carrying the category name while an element is annotated.
pub const CATEGORY_ATTRIBUTE: &str = "data-crawlset-category";

/// Capture settings shared by every page.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub outline_width: String,
    pub outline_style: String,
    /// Leave outlines in the screenshot.
    pub keep_visible: bool,
    pub output_dir: PathBuf,
    /// Delay between centering a target and capturing it.
    pub settle: Duration,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            outline_width: config.outline.width.clone(),
            outline_style: config.outline.style.clone(),
            keep_visible: config.outline.keep_visible,
            output_dir: config.output_dir.clone(),
            settle: Duration::from_millis(config.browser.settle_ms),
        }
    }
}

/// Open-and-capture behavior for expandable components.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub component_selectors: Vec<String>,
    pub trigger_selector: String,
    pub expected_selector: String,
    pub timeout: Duration,
}

impl From<&InteractionConfig> for Interaction {
    fn from(config: &InteractionConfig) -> Self {
        Self {
            component_selectors: config.component_selectors.clone(),
            trigger_selector: config.trigger_selector.clone(),
            expected_selector: config.expected_selector.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Result of one capture cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub image_id: u64,
    pub file_name: String,
    pub annotations: usize,
}

/// Summary of a target enumeration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumerationReport {
    pub candidates: usize,
    /// Targets with at least one successful capture.
    pub captured: usize,
    pub images: usize,
    pub failed: usize,
    pub stopped: bool,
}

struct Annotated {
    handle: ElementHandle,
    category: Category,
}

/// Drives capture cycles and owns the dataset being built.
pub struct CapturePipeline {
    settings: CaptureSettings,
    categories: CategoryTable,
    interaction: Option<Interaction>,
    dataset: DatasetWriter,
    shot_counters: HashMap<String, u32>,
    /// Inline outlines replaced during the current cycle.
    stash: HashMap<NodeKey, String>,
}

impl CapturePipeline {
    pub fn new(
        settings: CaptureSettings,
        categories: CategoryTable,
        interaction: Option<Interaction>,
        dataset: DatasetWriter,
    ) -> Self {
        Self {
            settings,
            categories,
            interaction,
            dataset,
            shot_counters: HashMap::new(),
            stash: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let categories = CategoryTable::from_config(config);
        let dataset = DatasetWriter::new(DatasetInfo::from_config(&config.dataset), &categories);
        Self::new(
            CaptureSettings::from_config(config),
            categories,
            config.interaction.as_ref().map(Interaction::from),
            dataset,
        )
    }

    pub fn dataset(&self) -> &DatasetWriter {
        &self.dataset
    }

    pub fn into_dataset(self) -> DatasetWriter {
        self.dataset
    }

    fn outline_for(&self, category: &Category) -> String {
        format!(
            "{} {} {}",
            self.settings.outline_width, self.settings.outline_style, category.color
        )
    }

    /// Annotate, measure and screenshot the current viewport.
    ///
    /// Handles acquired by the cycle are released and the page's outlines
    /// restored whether or not the cycle succeeds.
    pub async fn capture_cycle(
        &mut self,
        page: &dyn PageDriver,
        label: &str,
        specs: &[AnnotationSpec],
        include_iframes: bool,
    ) -> Result<CaptureOutcome, CaptureError> {
        let mut scope = HandleScope::new(page);
        let mut annotated = Vec::new();

        let result = self
            .run_cycle(page, label, specs, include_iframes, &mut scope, &mut annotated)
            .await;

        self.restore_outlines(page, &annotated).await;
        for item in &annotated {
            if let Err(e) = page.set_attribute(&item.handle, CATEGORY_ATTRIBUTE, None).await {
                debug!("Failed to untag {}: {}", item.handle.key(), e);
            }
        }
        scope.close().await;
        result
    }

    async fn run_cycle(
        &mut self,
        page: &dyn PageDriver,
        label: &str,
        specs: &[AnnotationSpec],
        include_iframes: bool,
        scope: &mut HandleScope<'_>,
        annotated: &mut Vec<Annotated>,
    ) -> Result<CaptureOutcome, CaptureError> {
        let document = scope.adopt(page.document().await?);
        let query = DeepQuery::new(page);

        // Later specs win for elements matched more than once.
        let mut order: Vec<NodeKey> = Vec::new();
        let mut chosen: HashMap<NodeKey, Annotated> = HashMap::new();
        for spec in specs {
            let Some(category) = self.categories.get(&spec.category).cloned() else {
                warn!(
                    "Skipping '{}': unknown category '{}'",
                    spec.selector, spec.category
                );
                continue;
            };
            let handles = match query
                .query_visible(&document, &spec.selector, include_iframes)
                .await
            {
                Ok(handles) => handles,
                Err(e) if e.is_selector() => {
                    warn!("Skipping annotation selector: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for handle in scope.adopt_all(handles) {
                match chosen.entry(handle.key()) {
                    Entry::Occupied(mut entry) => entry.get_mut().category = category.clone(),
                    Entry::Vacant(entry) => {
                        order.push(handle.key());
                        entry.insert(Annotated {
                            handle,
                            category: category.clone(),
                        });
                    }
                }
            }
        }
        annotated.extend(order.iter().filter_map(|key| chosen.remove(key)));

        for item in annotated.iter() {
            let outline = self.outline_for(&item.category);
            let previous = page.set_outline(&item.handle, &outline).await?;
            self.stash.entry(item.handle.key()).or_insert(previous);
            page.set_attribute(&item.handle, CATEGORY_ATTRIBUTE, Some(&item.category.name))
                .await?;
        }
        page.flush_render().await?;

        let viewport = page.viewport().await?;
        let mut boxes = Vec::with_capacity(annotated.len());
        for item in annotated.iter() {
            let rect = page.bounding_rect(&item.handle).await?;
            match rect.clip(&viewport) {
                Some(clipped) => boxes.push((
                    item.category.name.clone(),
                    clipped.scale(viewport.device_pixel_ratio),
                )),
                None => debug!("{} has no area inside the viewport", item.handle.key()),
            }
        }

        if !self.settings.keep_visible && !annotated.is_empty() {
            for item in annotated.iter() {
                page.set_outline(&item.handle, "").await?;
            }
            page.flush_render().await?;
        }

        let index = self.shot_counters.get(label).copied().unwrap_or(0) + 1;
        let file_name = format!("{}__{}.png", label, index);
        page.screenshot(&self.settings.output_dir.join(&file_name)).await?;
        self.shot_counters.insert(label.to_string(), index);

        if !self.settings.keep_visible && !annotated.is_empty() {
            self.restore_outlines(page, annotated).await;
            // The screenshot is on disk; it gets its record regardless.
            if let Err(e) = page.flush_render().await {
                debug!("Flush after restoring outlines failed: {}", e);
            }
        }

        let (width, height) = viewport.image_size();
        let image_id = self.dataset.add_image(file_name.clone(), width, height);
        let mut count = 0;
        for (category, rect) in boxes {
            let bbox = [rect.x, rect.y, rect.width, rect.height];
            if self
                .dataset
                .add_annotation(image_id, &category, bbox, None, 0)
                .is_some()
            {
                count += 1;
            }
        }

        info!("Captured {} with {} annotations", file_name, count);
        Ok(CaptureOutcome {
            image_id,
            file_name,
            annotations: count,
        })
    }

    /// Put back the outlines stashed for `annotated`.
    async fn restore_outlines(&mut self, page: &dyn PageDriver, annotated: &[Annotated]) {
        for item in annotated {
            let Some(previous) = self.stash.remove(&item.handle.key()) else {
                continue;
            };
            if let Err(e) = page.set_outline(&item.handle, &previous).await {
                debug!("Failed to restore outline of {}: {}", item.handle.key(), e);
            }
        }
    }

    /// Collect the page's targets and capture each in discovery order.
    ///
    /// Failures on one target are logged and the enumeration moves on. A
    /// stop signal ends it at the next target boundary.
    pub async fn enumerate_targets(
        &mut self,
        page: &dyn PageDriver,
        gate: &mut RunGate,
        config: &PageConfig,
        tuning: &ScrollTuning,
    ) -> Result<EnumerationReport, CaptureError> {
        let mut harvest = TargetHarvest::new(config.targets.clone(), config.include_iframes);
        let mut report = EnumerationReport::default();

        let candidates = if config.scroll_for_targets {
            let session = converge(page, gate, &mut harvest, tuning, config.max_shots).await?;
            report.stopped = session.stopped;
            session.items
        } else {
            let mut items = Vec::new();
            harvest.harvest(page, &mut items).await?;
            items
        };
        report.candidates = candidates.len();
        info!(
            "Page '{}': {} candidate targets",
            config.label,
            candidates.len()
        );

        for (i, target) in candidates.iter().take(config.max_shots).enumerate() {
            if report.stopped || gate.checkpoint().await.is_stop() {
                report.stopped = true;
                break;
            }
            match self.capture_target(page, target, config).await {
                Ok(images) => {
                    report.captured += 1;
                    report.images += images;
                }
                Err(e) => {
                    warn!("Target {} ({}) on '{}' failed: {}", i + 1, target.key(), config.label, e);
                    report.failed += 1;
                }
            }
        }

        release_all(page, candidates).await;
        Ok(report)
    }

    /// Center a target and capture it, opening it first-capture-then-open
    /// when it is an interactive component.
    async fn capture_target(
        &mut self,
        page: &dyn PageDriver,
        target: &ElementHandle,
        config: &PageConfig,
    ) -> Result<usize, CaptureError> {
        page.scroll_to_center(target).await?;
        tokio::time::sleep(self.settings.settle).await;

        let interactive = self.is_component(page, target).await;
        self.capture_cycle(page, &config.label, &config.annotations, config.include_iframes)
            .await?;
        if !interactive {
            return Ok(1);
        }

        match self.open_component(page, target).await {
            Ok(true) => {}
            Ok(false) => return Ok(1),
            Err(e) => {
                warn!("Could not open component {}: {}", target.key(), e);
                return Ok(1);
            }
        }

        tokio::time::sleep(self.settings.settle).await;
        match self
            .capture_cycle(page, &config.label, &config.annotations, config.include_iframes)
            .await
        {
            Ok(_) => Ok(2),
            Err(e) => {
                warn!("Capture of opened component {} failed: {}", target.key(), e);
                Ok(1)
            }
        }
    }

    async fn is_component(&self, page: &dyn PageDriver, target: &ElementHandle) -> bool {
        let Some(interaction) = &self.interaction else {
            return false;
        };
        for selector in &interaction.component_selectors {
            match page.matches(target, selector).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("Component selector '{}' failed: {}", selector, e),
            }
        }
        false
    }

    /// Click the component's trigger and wait for its expected content.
    ///
    /// Returns `false` when the component has no trigger.
    async fn open_component(
        &self,
        page: &dyn PageDriver,
        target: &ElementHandle,
    ) -> Result<bool, CaptureError> {
        let Some(interaction) = &self.interaction else {
            return Ok(false);
        };
        let query = DeepQuery::new(page);

        let triggers = query
            .query_all(target, &interaction.trigger_selector, false)
            .await?;
        let Some(trigger) = triggers.first().cloned() else {
            debug!("No trigger in component {}", target.key());
            return Ok(false);
        };
        let clicked = page.click(&trigger).await;
        release_all(page, triggers).await;
        clicked?;

        let appeared = query
            .wait_for_any(target, &interaction.expected_selector, false, interaction.timeout)
            .await?;
        if appeared.is_empty() {
            info!(
                "'{}' did not appear in {} within {:?}, capturing anyway",
                interaction.expected_selector,
                target.key(),
                interaction.timeout
            );
        }
        release_all(page, appeared).await;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
