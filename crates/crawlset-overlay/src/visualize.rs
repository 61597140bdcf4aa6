//! Batch rendering of overlays for a dataset folder.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::dataset::{find_dataset_json, load_dataset, DatasetIndex};
use crate::draw::{category_colors, draw_overlay, OverlayStyle};
use crate::error::OverlayError;

/// Outcome of a [`visualize`] run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualizeReport {
    /// Overlay files written.
    pub processed: Vec<PathBuf>,
    /// Image files listed in the dataset but absent from the folder.
    pub missing: Vec<String>,
}

/// Parse a comma-separated `--subset` value.
pub fn parse_subset(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Draw the dataset found in `folder` over its images and save each as
/// `<stem>__overlay.png` in `save_dir`.
///
/// `subset`, when given, limits the run to those image file names.
pub fn visualize(
    folder: &Path,
    save_dir: &Path,
    subset: Option<&HashSet<String>>,
    style: OverlayStyle,
) -> Result<VisualizeReport, OverlayError> {
    if !folder.is_dir() {
        return Err(OverlayError::NotADirectory(folder.to_path_buf()));
    }

    let dataset_path = find_dataset_json(folder)?;
    info!("Using dataset {}", dataset_path.display());
    let index = DatasetIndex::new(load_dataset(&dataset_path)?);
    let colors = category_colors(&index);

    fs::create_dir_all(save_dir).map_err(|source| OverlayError::Io {
        path: save_dir.to_path_buf(),
        source,
    })?;

    let mut report = VisualizeReport::default();
    for (image_id, image) in &index.images {
        if subset.is_some_and(|names| !names.is_empty() && !names.contains(&image.file_name)) {
            continue;
        }

        let image_path = folder.join(&image.file_name);
        if !image_path.exists() {
            report.missing.push(image.file_name.clone());
            continue;
        }

        let mut img = image::open(&image_path)
            .map_err(|source| OverlayError::Image {
                path: image_path.clone(),
                source,
            })?
            .to_rgba8();
        let annotations = index.annotations_for(*image_id);
        draw_overlay(&mut img, annotations, &index, &colors, style);

        let stem = Path::new(&image.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_id.to_string());
        let out_path = save_dir.join(format!("{}__overlay.png", stem));
        img.save(&out_path).map_err(|source| OverlayError::Image {
            path: out_path.clone(),
            source,
        })?;
        info!(
            "Saved {} ({} box{})",
            out_path.display(),
            annotations.len(),
            if annotations.len() == 1 { "" } else { "es" }
        );
        report.processed.push(out_path);
    }

    if !report.missing.is_empty() {
        warn!(
            "Image files listed in the dataset were not found in {}: {}",
            folder.display(),
            report.missing.join(", ")
        );
    }
    if report.processed.is_empty() {
        warn!("No images were processed. Check the subset filter or that image files exist.");
    }
    Ok(report)
}
