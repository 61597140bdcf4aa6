//! Overlay errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("'{0}' does not exist or is not a directory")]
    NotADirectory(PathBuf),

    #[error("No .json file found in {0}")]
    NoDataset(PathBuf),

    #[error(
        "Multiple .json files found: {}. Keep only one or rename the desired file to 'annotations.json'.",
        names.join(", ")
    )]
    AmbiguousDataset { names: Vec<String> },

    #[error("Dataset file missing '{0}' section")]
    MissingSection(&'static str),

    #[error("Malformed dataset: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
