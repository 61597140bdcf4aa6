//! COCO-style dataset accumulation and serialization.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crawlset_config::{Config, DatasetInfoConfig};

use crate::error::DatasetError;

/// Colors assigned to categories without an override, cycled by id.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// An annotation category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: u32,
    pub name: String,
    pub color: String,
}

/// Categories of a run with ids fixed in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    categories: Vec<Category>,
}

impl CategoryTable {
    /// Build from names in first-seen order; duplicates are ignored.
    pub fn new<S: AsRef<str>>(names: &[S], colors: &HashMap<String, String>) -> Self {
        let mut categories: Vec<Category> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if categories.iter().any(|c| c.name == name) {
                continue;
            }
            let id = categories.len() as u32 + 1;
            let color = colors
                .get(name)
                .cloned()
                .unwrap_or_else(|| PALETTE[(id as usize - 1) % PALETTE.len()].to_string());
            categories.push(Category {
                id,
                name: name.to_string(),
                color,
            });
        }
        Self { categories }
    }

    /// Table covering every annotation spec of every page.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.category_names(), &config.outline.colors)
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Dataset `info` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub description: String,
    pub version: String,
    pub year: i32,
    pub contributor: String,
    pub date_created: String,
}

impl DatasetInfo {
    pub fn from_config(config: &DatasetInfoConfig) -> Self {
        let now = Utc::now();
        Self {
            description: config.description.clone(),
            version: config.version.clone(),
            year: config.year.unwrap_or_else(|| now.year()),
            contributor: config.contributor.clone(),
            date_created: now.to_rfc3339(),
        }
    }
}

impl Default for DatasetInfo {
    fn default() -> Self {
        Self::from_config(&DatasetInfoConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,
    /// `[x, y, width, height]` in image pixels.
    pub bbox: [u32; 4],
    pub area: f64,
    pub iscrowd: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: u32,
    pub name: String,
}

/// The serialized dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub info: DatasetInfo,
    pub licenses: Vec<serde_json::Value>,
    pub images: Vec<ImageRecord>,
    pub annotations: Vec<AnnotationRecord>,
    pub categories: Vec<CategoryRecord>,
}

/// In-memory dataset, written once at the end of a run.
#[derive(Debug)]
pub struct DatasetWriter {
    info: DatasetInfo,
    categories: Vec<CategoryRecord>,
    category_ids: HashMap<String, u32>,
    images: Vec<ImageRecord>,
    image_sizes: HashMap<u64, (u32, u32)>,
    annotations: Vec<AnnotationRecord>,
}

impl DatasetWriter {
    /// Create a writer whose categories and ids are those of `table`.
    pub fn new(info: DatasetInfo, table: &CategoryTable) -> Self {
        let categories: Vec<CategoryRecord> = table
            .iter()
            .map(|c| CategoryRecord {
                id: c.id,
                name: c.name.clone(),
            })
            .collect();
        let category_ids = table.iter().map(|c| (c.name.clone(), c.id)).collect();
        Self {
            info,
            categories,
            category_ids,
            images: Vec::new(),
            image_sizes: HashMap::new(),
            annotations: Vec::new(),
        }
    }

    pub fn category_id(&self, name: &str) -> Option<u32> {
        self.category_ids.get(name).copied()
    }

    /// Register a captured image and return its id.
    pub fn add_image(&mut self, file_name: impl Into<String>, width: u32, height: u32) -> u64 {
        let id = self.images.len() as u64 + 1;
        let file_name = file_name.into();
        debug!("Image {} registered: {} ({}x{})", id, file_name, width, height);
        self.images.push(ImageRecord {
            id,
            file_name,
            width,
            height,
        });
        self.image_sizes.insert(id, (width, height));
        id
    }

    /// Record a bounding box on a registered image.
    ///
    /// Components are rounded to non-negative integers and clamped to the
    /// image. Returns `None` for unknown images or categories and for boxes
    /// left without area. `area` defaults to `width * height`.
    pub fn add_annotation(
        &mut self,
        image_id: u64,
        category: &str,
        bbox: [f64; 4],
        area: Option<f64>,
        iscrowd: u8,
    ) -> Option<u64> {
        let category_id = self.category_id(category)?;
        let (image_width, image_height) = *self.image_sizes.get(&image_id)?;

        let x = round_component(bbox[0]).min(image_width);
        let y = round_component(bbox[1]).min(image_height);
        let w = round_component(bbox[2]).min(image_width - x);
        let h = round_component(bbox[3]).min(image_height - y);
        if w == 0 || h == 0 {
            return None;
        }

        let id = self.annotations.len() as u64 + 1;
        self.annotations.push(AnnotationRecord {
            id,
            image_id,
            category_id,
            bbox: [x, y, w, h],
            area: area.unwrap_or(f64::from(w) * f64::from(h)),
            iscrowd,
        });
        Some(id)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn annotations(&self) -> &[AnnotationRecord] {
        &self.annotations
    }

    pub fn to_document(&self) -> DatasetDocument {
        DatasetDocument {
            info: self.info.clone(),
            licenses: Vec::new(),
            images: self.images.clone(),
            annotations: self.annotations.clone(),
            categories: self.categories.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, DatasetError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Serialize to `path`, creating its parent directory.
    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let json = self.to_json()?;
        let io_error = |source| DatasetError::Write {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, json).map_err(io_error)?;

        info!(
            "Dataset written to {} ({} images, {} annotations)",
            path.display(),
            self.images.len(),
            self.annotations.len()
        );
        Ok(())
    }
}

fn round_component(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[cfg(test)]
#[path = "dataset_tests.rs"]
mod tests;
