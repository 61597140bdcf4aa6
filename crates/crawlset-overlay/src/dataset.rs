//! Reading a COCO dataset back for inspection.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::OverlayError;

/// File names preferred when a folder holds several JSON files.
pub const PREFERRED_NAMES: [&str; 2] = ["annotations.json", "coco.json"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageEntry {
    pub id: u64,
    pub file_name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnnotationEntry {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,
    /// `[x, y, width, height]`
    pub bbox: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryEntry {
    pub id: u32,
    pub name: String,
}

/// The sections of a dataset the overlay needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub images: Vec<ImageEntry>,
    pub annotations: Vec<AnnotationEntry>,
    pub categories: Vec<CategoryEntry>,
}

/// Locate the dataset file in `folder`.
///
/// A single `*.json` file is taken as is. With several, the one named
/// `annotations.json` or `coco.json` wins if exactly one of them exists.
pub fn find_dataset_json(folder: &Path) -> Result<PathBuf, OverlayError> {
    let entries = fs::read_dir(folder).map_err(|source| OverlayError::Io {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut jsons: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    jsons.sort();

    match jsons.len() {
        0 => Err(OverlayError::NoDataset(folder.to_path_buf())),
        1 => Ok(jsons.remove(0)),
        _ => {
            let preferred: Vec<&PathBuf> = jsons
                .iter()
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| PREFERRED_NAMES.contains(&n))
                })
                .collect();
            if let [only] = preferred.as_slice() {
                return Ok((*only).clone());
            }
            Err(OverlayError::AmbiguousDataset {
                names: jsons
                    .iter()
                    .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .collect(),
            })
        }
    }
}

/// Parse a dataset file, requiring its `images`, `annotations` and
/// `categories` sections.
pub fn load_dataset(path: &Path) -> Result<Dataset, OverlayError> {
    let text = fs::read_to_string(path).map_err(|source| OverlayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text)?;
    for section in ["images", "annotations", "categories"] {
        if value.get(section).is_none() {
            return Err(OverlayError::MissingSection(section));
        }
    }
    let dataset: Dataset = serde_json::from_value(value)?;
    debug!(
        "Loaded {}: {} images, {} annotations, {} categories",
        path.display(),
        dataset.images.len(),
        dataset.annotations.len(),
        dataset.categories.len()
    );
    Ok(dataset)
}

/// Lookups joining images, annotations and categories.
#[derive(Debug, Clone, Default)]
pub struct DatasetIndex {
    pub images: BTreeMap<u64, ImageEntry>,
    pub annotations: HashMap<u64, Vec<AnnotationEntry>>,
    pub categories: BTreeMap<u32, CategoryEntry>,
}

impl DatasetIndex {
    pub fn new(dataset: Dataset) -> Self {
        let mut index = Self::default();
        for image in dataset.images {
            index.images.insert(image.id, image);
        }
        for ann in dataset.annotations {
            index.annotations.entry(ann.image_id).or_default().push(ann);
        }
        for category in dataset.categories {
            index.categories.insert(category.id, category);
        }
        index
    }

    pub fn annotations_for(&self, image_id: u64) -> &[AnnotationEntry] {
        self.annotations
            .get(&image_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Display name of a category, falling back to its id.
    pub fn category_name(&self, id: u32) -> String {
        self.categories
            .get(&id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    const MINIMAL: &str = r#"{
        "images": [{"id": 2, "file_name": "b.png", "width": 10, "height": 10},
                   {"id": 1, "file_name": "a.png", "width": 10, "height": 10}],
        "annotations": [{"id": 1, "image_id": 1, "category_id": 1, "bbox": [1, 2, 3, 4], "area": 12, "iscrowd": 0},
                        {"id": 2, "image_id": 1, "category_id": 9, "bbox": [0.5, 0, 2, 2]}],
        "categories": [{"id": 1, "name": "title"}]
    }"#;

    #[test]
    fn test_find_single_json() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "whatever.json", "{}");
        touch(dir.path(), "a.png", "");
        assert_eq!(find_dataset_json(dir.path()).unwrap(), dir.path().join("whatever.json"));
    }

    #[test]
    fn test_find_prefers_annotations_json() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "annotations.json", "{}");
        touch(dir.path(), "notes.json", "{}");
        assert_eq!(
            find_dataset_json(dir.path()).unwrap(),
            dir.path().join("annotations.json")
        );
    }

    #[test]
    fn test_find_ambiguous() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "annotations.json", "{}");
        touch(dir.path(), "coco.json", "{}");
        match find_dataset_json(dir.path()).unwrap_err() {
            OverlayError::AmbiguousDataset { names } => {
                assert_eq!(names, vec!["annotations.json", "coco.json"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_find_none() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            find_dataset_json(dir.path()),
            Err(OverlayError::NoDataset(_))
        ));
    }

    #[test]
    fn test_load_requires_sections() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "d.json", r#"{"images": [], "categories": []}"#);
        assert!(matches!(
            load_dataset(&dir.path().join("d.json")),
            Err(OverlayError::MissingSection("annotations"))
        ));
    }

    #[test]
    fn test_index_joins() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "d.json", MINIMAL);
        let index = DatasetIndex::new(load_dataset(&dir.path().join("d.json")).unwrap());

        let ids: Vec<u64> = index.images.keys().copied().collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(index.annotations_for(1).len(), 2);
        assert!(index.annotations_for(2).is_empty());
        assert_eq!(index.category_name(1), "title");
        assert_eq!(index.category_name(9), "9");
    }
}
