//! Browser driver boundary.
//!
//! The crawl core never talks to a browser directly. It drives pages through
//! [`PageDriver`] and opens extra browsing contexts through [`Browser`]; the
//! CDP implementation lives in `crawlset-browser`.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::DriverError;

/// Stable identity of a DOM node across queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub i64);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Opaque reference to a live node in some document, shadow root or
/// iframe document.
///
/// Two handles to the same node carry different remote ids but the same
/// [`NodeKey`]. Handles must be given back through [`PageDriver::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    remote_id: String,
    key: NodeKey,
}

impl ElementHandle {
    pub fn new(remote_id: impl Into<String>, key: NodeKey) -> Self {
        Self {
            remote_id: remote_id.into(),
            key,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }
}

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether any part of the rectangle lies inside the viewport.
    pub fn intersects(&self, viewport: &Viewport) -> bool {
        self.bottom() > 0.0
            && self.right() > 0.0
            && self.y < viewport.height
            && self.x < viewport.width
    }

    /// Restrict to `[0, width] x [0, height]` of the viewport.
    ///
    /// Returns `None` when nothing with positive area is left.
    pub fn clip(&self, viewport: &Viewport) -> Option<Rect> {
        let left = self.x.max(0.0);
        let top = self.y.max(0.0);
        let right = self.right().min(viewport.width);
        let bottom = self.bottom().min(viewport.height);
        let width = right - left;
        let height = bottom - top;
        if width > 0.0 && height > 0.0 {
            Some(Rect::new(left, top, width, height))
        } else {
            None
        }
    }

    pub fn scale(&self, factor: f64) -> Rect {
        Rect::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Layout viewport and device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio,
        }
    }

    /// Size of a viewport screenshot in device pixels.
    pub fn image_size(&self) -> (u32, u32) {
        let dpr = self.device_pixel_ratio;
        (
            (self.width * dpr).round().max(0.0) as u32,
            (self.height * dpr).round().max(0.0) as u32,
        )
    }
}

/// Computed style and geometry needed by the visibility filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementState {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub rect: Rect,
}

/// One browsing context.
///
/// `root` arguments accept any handle that supports `querySelectorAll`:
/// documents, shadow roots and elements.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Identifier of the underlying browsing context.
    fn page_id(&self) -> &str;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Handle to the top-level document.
    async fn document(&self) -> Result<ElementHandle, DriverError>;

    /// `root.querySelectorAll(selector)` without crossing shadow or frame
    /// boundaries, in document order.
    async fn select_all(
        &self,
        root: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Open shadow roots hosted by `root` itself or by any element of its
    /// tree, in document order. Nested shadow trees are not entered.
    async fn shadow_roots(&self, root: &ElementHandle) -> Result<Vec<ElementHandle>, DriverError>;

    /// Documents of the same-origin iframes in `root`'s tree. Cross-origin
    /// frames are left out.
    async fn frame_documents(&self, root: &ElementHandle)
        -> Result<Vec<ElementHandle>, DriverError>;

    async fn matches(&self, element: &ElementHandle, selector: &str) -> Result<bool, DriverError>;

    async fn element_state(&self, element: &ElementHandle) -> Result<ElementState, DriverError>;

    /// Bounding client rect in top-level viewport coordinates.
    async fn bounding_rect(&self, element: &ElementHandle) -> Result<Rect, DriverError>;

    async fn viewport(&self) -> Result<Viewport, DriverError>;

    /// Set the inline outline and return the previous inline value.
    async fn set_outline(&self, element: &ElementHandle, outline: &str)
        -> Result<String, DriverError>;

    /// Set an attribute, or remove it when `value` is `None`.
    async fn set_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), DriverError>;

    /// Force layout and wait for one animation frame.
    async fn flush_render(&self) -> Result<(), DriverError>;

    async fn scroll_by(&self, dy: f64) -> Result<(), DriverError>;

    /// Scroll so the element's center sits at the viewport center.
    async fn scroll_to_center(&self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Resolved absolute `href` of an anchor, if any.
    async fn href(&self, element: &ElementHandle) -> Result<Option<String>, DriverError>;

    /// Write a PNG of the current viewport (not the full page).
    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    async fn release(&self, element: &ElementHandle) -> Result<(), DriverError>;
}

/// Opens and closes browsing contexts.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, DriverError>;

    async fn close_page(&self, page: Box<dyn PageDriver>) -> Result<(), DriverError>;
}

/// Release handles, swallowing failures.
pub async fn release_all<I>(page: &dyn PageDriver, handles: I)
where
    I: IntoIterator<Item = ElementHandle>,
    I::IntoIter: Send,
{
    for handle in handles {
        if let Err(e) = page.release(&handle).await {
            debug!("Failed to release {}: {}", handle.key(), e);
        }
    }
}

/// Tracks handles acquired during one unit of work so they can all be
/// released when it ends, on success and on error alike.
pub struct HandleScope<'a> {
    page: &'a dyn PageDriver,
    handles: Vec<ElementHandle>,
}

impl<'a> HandleScope<'a> {
    pub fn new(page: &'a dyn PageDriver) -> Self {
        Self {
            page,
            handles: Vec::new(),
        }
    }

    /// Take ownership of a handle, returning a copy for use.
    pub fn adopt(&mut self, handle: ElementHandle) -> ElementHandle {
        self.handles.push(handle.clone());
        handle
    }

    pub fn adopt_all(&mut self, handles: Vec<ElementHandle>) -> Vec<ElementHandle> {
        self.handles.extend(handles.iter().cloned());
        handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn close(self) {
        release_all(self.page, self.handles).await;
    }
}
