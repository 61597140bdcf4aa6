//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// URL of the first page to open.
    pub target_url: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Dataset file path. Defaults to `<output_dir>/annotations.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<PathBuf>,

    /// Send `start` to the run-state controller at boot instead of waiting
    /// for a keyboard signal.
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub scroll: ScrollConfig,

    #[serde(default)]
    pub outline: OutlineConfig,

    #[serde(default)]
    pub dataset: DatasetInfoConfig,

    #[serde(default)]
    pub pages: Vec<PageConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<LinksConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<InteractionConfig>,
}

impl Config {
    /// Resolved dataset output path.
    pub fn dataset_path(&self) -> PathBuf {
        self.dataset_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join("annotations.json"))
    }

    /// Look up a page configuration by label.
    pub fn page(&self, label: &str) -> Option<&PageConfig> {
        self.pages.iter().find(|p| p.label == label)
    }

    /// The page configuration applied to `target_url`.
    ///
    /// This is the page named by `links.page` when link following is
    /// configured, otherwise the first page.
    pub fn entry_page(&self) -> Option<&PageConfig> {
        match &self.links {
            Some(links) => self.page(&links.page),
            None => self.pages.first(),
        }
    }

    /// Category names in first-seen order across every page's annotations.
    pub fn category_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for spec in self.pages.iter().flat_map(|p| p.annotations.iter()) {
            if !names.iter().any(|n| n == &spec.category) {
                names.push(spec.category.clone());
            }
        }
        names
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dataset")
}

fn default_autostart() -> bool {
    true
}

/// Browser connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Persistent profile directory (keeps logins between runs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,

    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Delay after centering a target before capturing it.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            profile_dir: None,
            headless: false,
            navigation_timeout_ms: default_navigation_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_debug_port() -> u16 {
    9222
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    800
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    300
}

/// Scroll tuning shared by link and target harvesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Scroll distance as a fraction of the viewport height.
    #[serde(default = "default_step")]
    pub step: f64,

    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,

    /// Consecutive rounds without growth before the collector gives up.
    #[serde(default = "default_stable_rounds")]
    pub stable_rounds: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            step: default_step(),
            sleep_ms: default_sleep_ms(),
            stable_rounds: default_stable_rounds(),
        }
    }
}

fn default_step() -> f64 {
    0.8
}

fn default_sleep_ms() -> u64 {
    800
}

fn default_stable_rounds() -> u32 {
    3
}

/// Outline drawn around annotated elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineConfig {
    #[serde(default = "default_outline_width")]
    pub width: String,

    #[serde(default = "default_outline_style")]
    pub style: String,

    /// Keep outlines visible in the captured image.
    #[serde(default)]
    pub keep_visible: bool,

    /// Per-category color overrides.
    #[serde(default)]
    pub colors: HashMap<String, String>,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            width: default_outline_width(),
            style: default_outline_style(),
            keep_visible: false,
            colors: HashMap::new(),
        }
    }
}

fn default_outline_width() -> String {
    "3px".to_string()
}

fn default_outline_style() -> String {
    "solid".to_string()
}

/// Dataset `info` metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfoConfig {
    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default)]
    pub contributor: String,
}

impl Default for DatasetInfoConfig {
    fn default() -> Self {
        Self {
            description: default_description(),
            version: default_version(),
            year: None,
            contributor: String::new(),
        }
    }
}

fn default_description() -> String {
    "crawlset UI element dataset".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A (selector, category) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSpec {
    pub selector: String,
    pub category: String,
}

impl AnnotationSpec {
    pub fn new(selector: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            category: category.into(),
        }
    }
}

/// Per-page capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Label used in screenshot file names.
    pub label: String,

    /// Selectors of the elements each capture is centered on.
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default = "default_max_shots")]
    pub max_shots: usize,

    /// Grow the target set by scrolling before capturing.
    #[serde(default = "default_scroll_for_targets")]
    pub scroll_for_targets: bool,

    #[serde(default = "default_include_iframes")]
    pub include_iframes: bool,

    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
}

fn default_max_shots() -> usize {
    10
}

fn default_scroll_for_targets() -> bool {
    true
}

fn default_include_iframes() -> bool {
    true
}

/// Link harvesting from the entry page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Label of the page configuration the links are harvested from.
    pub page: String,

    /// Label of the page configuration applied to every followed link.
    pub follow: String,

    /// Selectors of the elements links are resolved from.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Selector, scoped to a target, of the control that opens it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_selector: Option<String>,

    /// Regex an anchor `href` must match to count as a comments link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments_pattern: Option<String>,

    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

fn default_max_links() -> usize {
    5
}

/// Open-and-capture interaction for expandable components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    #[serde(default)]
    pub component_selectors: Vec<String>,

    pub trigger_selector: String,

    pub expected_selector: String,

    #[serde(default = "default_interaction_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interaction_timeout_ms() -> u64 {
    3_000
}
