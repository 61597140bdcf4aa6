//! # crawlset Core
//!
//! Browser-agnostic crawl engine for building COCO datasets of UI elements.
//!
//! ## Components
//!
//! - [`PageDriver`] / [`Browser`] - The driver boundary a browser backend implements
//! - [`DeepQuery`] - Selector queries across open shadow roots and same-origin iframes
//! - [`converge`] - Scroll-until-stable collection over a [`Harvest`]
//! - [`CapturePipeline`] - Outline, measure and screenshot cycles per target
//! - [`DatasetWriter`] - COCO JSON accumulation and output
//! - [`RunStateController`] - Start / pause / stop control shared with the input surface
//! - [`Crawler`] - Entry page and followed-link orchestration

pub mod capture;
pub mod collector;
pub mod crawl;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod harvest;
pub mod query;
pub mod run_state;
pub mod visibility;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use capture::{CapturePipeline, CaptureSettings, EnumerationReport, Interaction};
pub use collector::{converge, Harvest, ScrollSession, ScrollTuning};
pub use crawl::{CrawlReport, Crawler};
pub use dataset::{CategoryTable, DatasetDocument, DatasetInfo, DatasetWriter, PALETTE};
pub use driver::{Browser, ElementHandle, ElementState, NodeKey, PageDriver, Rect, Viewport};
pub use error::{CaptureError, CrawlError, DatasetError, DriverError, QueryError};
pub use harvest::{LinkHarvest, LinkStrategy, TargetHarvest};
pub use query::{DeepQuery, Strategy};
pub use run_state::{Flow, RunGate, RunState, RunStateController, Signal};
pub use visibility::is_visible;
