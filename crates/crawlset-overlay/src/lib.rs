//! # crawlset Overlay
//!
//! Renders a COCO dataset's bounding boxes over its images for visual
//! inspection: one outline per annotation, colored per category, with a
//! `<category>#<annotation id>` label.

mod dataset;
mod draw;
mod error;
mod visualize;

pub use dataset::{
    find_dataset_json, load_dataset, AnnotationEntry, CategoryEntry, Dataset, DatasetIndex,
    ImageEntry,
};
pub use draw::{category_colors, draw_overlay, draw_rect_outline, line_width, OverlayStyle, PALETTE};
pub use error::OverlayError;
pub use visualize::{parse_subset, visualize, VisualizeReport};
