//! In-memory driver for tests.
//!
//! [`FakeDom`] models documents, open shadow roots, iframes, lazily attached
//! content and click-revealed children. [`FakePage`] serves it through
//! [`PageDriver`] and records what the crawl did (scrolls, clicks,
//! screenshots and the outlines visible in each one).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{Browser, ElementHandle, ElementState, NodeKey, PageDriver, Rect, Viewport};
use crate::error::DriverError;

/// Index of a node inside a [`FakeDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Document,
    ShadowRoot,
    Element,
}

#[derive(Debug, Clone)]
struct FakeNode {
    kind: NodeKind,
    tag: String,
    attrs: BTreeMap<String, String>,
    children: Vec<NodeId>,
    shadow: Option<NodeId>,
    frame: Option<NodeId>,
    cross_origin: bool,
    projected: Vec<NodeId>,
    rect: Rect,
    display: String,
    visibility: String,
    opacity: String,
    outline: String,
    attached: bool,
    appears_at: Option<f64>,
    reveals: Vec<NodeId>,
}

impl FakeNode {
    fn new(kind: NodeKind, tag: &str) -> Self {
        Self {
            kind,
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
            shadow: None,
            frame: None,
            cross_origin: false,
            projected: Vec::new(),
            rect: Rect::new(0.0, 0.0, 100.0, 20.0),
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: "1".to_string(),
            outline: String::new(),
            attached: true,
            appears_at: None,
            reveals: Vec::new(),
        }
    }
}

/// A small DOM: one top-level document plus any shadow roots and frame
/// documents hanging off it. Element rects are in page coordinates.
#[derive(Debug, Clone)]
pub struct FakeDom {
    nodes: Vec<FakeNode>,
    viewport: Viewport,
}

impl FakeDom {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            nodes: vec![FakeNode::new(NodeKind::Document, "#document")],
            viewport,
        }
    }

    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    pub fn key(&self, id: NodeId) -> NodeKey {
        NodeKey(id.0 as i64 + 1)
    }

    fn push(&mut self, node: FakeNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Append an element described as `tag#id.class[attr=value]`.
    ///
    /// # Panics
    ///
    /// Panics if `spec` is not a single compound selector with a tag.
    pub fn append(&mut self, parent: NodeId, spec: &str) -> NodeId {
        let compound = match parse_selector(spec) {
            Ok(mut list) if list.len() == 1 => list.remove(0),
            _ => panic!("bad element spec: {spec}"),
        };
        let tag = compound.tag.clone().unwrap_or_else(|| panic!("element spec needs a tag: {spec}"));
        let mut node = FakeNode::new(NodeKind::Element, &tag);
        if let Some(id) = compound.id {
            node.attrs.insert("id".to_string(), id);
        }
        if !compound.classes.is_empty() {
            node.attrs.insert("class".to_string(), compound.classes.join(" "));
        }
        for (name, value) in compound.attrs {
            node.attrs.insert(name, value.unwrap_or_default());
        }
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn append_at(&mut self, parent: NodeId, spec: &str, rect: Rect) -> NodeId {
        let id = self.append(parent, spec);
        self.set_rect(id, rect);
        id
    }

    /// Attach an open shadow root to `host`.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        let root = self.push(FakeNode::new(NodeKind::ShadowRoot, "#shadow-root"));
        self.nodes[host.0].shadow = Some(root);
        root
    }

    /// Append an iframe and return `(iframe, content document)`.
    pub fn append_frame(&mut self, parent: NodeId, same_origin: bool) -> (NodeId, NodeId) {
        let frame = self.append(parent, "iframe");
        let doc = self.push(FakeNode::new(NodeKind::Document, "#document"));
        self.nodes[frame.0].frame = Some(doc);
        self.nodes[frame.0].cross_origin = !same_origin;
        (frame, doc)
    }

    /// Make `node` also match queries run on `root`, like slotted content.
    pub fn project(&mut self, root: NodeId, node: NodeId) {
        self.nodes[root.0].projected.push(node);
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        self.nodes[id.0].rect = rect;
    }

    pub fn set_style(&mut self, id: NodeId, display: &str, visibility: &str, opacity: &str) {
        let node = &mut self.nodes[id.0];
        node.display = display.to_string();
        node.visibility = visibility.to_string();
        node.opacity = opacity.to_string();
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id.0].attrs.insert(name.to_string(), value.to_string());
    }

    pub fn set_outline(&mut self, id: NodeId, outline: &str) {
        self.nodes[id.0].outline = outline.to_string();
    }

    /// Keep `id` out of the DOM until the page has scrolled to `scroll_y`.
    pub fn appear_after_scroll(&mut self, id: NodeId, scroll_y: f64) {
        self.nodes[id.0].appears_at = Some(scroll_y);
    }

    /// Keep `target` out of the DOM until `trigger` is clicked.
    pub fn reveal_on_click(&mut self, trigger: NodeId, target: NodeId) {
        self.nodes[target.0].attached = false;
        self.nodes[trigger.0].reveals.push(target);
    }

    fn is_attached(&self, id: NodeId, scroll_y: f64) -> bool {
        let node = &self.nodes[id.0];
        node.attached && node.appears_at.is_none_or(|at| scroll_y >= at)
    }

    /// Light-tree descendants of `root` in document order, skipping
    /// detached subtrees.
    fn descendants(&self, root: NodeId, scroll_y: f64) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root.0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !self.is_attached(id, scroll_y) {
                continue;
            }
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    fn matches(&self, id: NodeId, selector: &[Compound]) -> bool {
        let node = &self.nodes[id.0];
        node.kind == NodeKind::Element && selector.iter().any(|c| c.matches(node))
    }
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &FakeNode) -> bool {
        if let Some(tag) = &self.tag {
            if tag != &node.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attrs.get("id") != Some(id) {
                return false;
            }
        }
        let classes: Vec<&str> = node
            .attrs
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default();
        if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
        self.attrs.iter().all(|(name, value)| match (node.attrs.get(name), value) {
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
            (None, _) => false,
        })
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Parse a comma-separated list of compound selectors
/// (`tag`, `*`, `.class`, `#id`, `[attr]`, `[attr=value]`).
fn parse_selector(selector: &str) -> Result<Vec<Compound>, DriverError> {
    let invalid = || DriverError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("'{}' is not a valid selector", selector),
    };

    let mut out = Vec::new();
    for part in selector.split(',') {
        let chars: Vec<char> = part.trim().chars().collect();
        if chars.is_empty() {
            return Err(invalid());
        }
        let ident = |i: &mut usize| -> String {
            let start = *i;
            while *i < chars.len() && is_ident(chars[*i]) {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        };

        let mut compound = Compound::default();
        let mut i = 0;
        if chars[0] == '*' {
            i = 1;
        } else if is_ident(chars[0]) {
            compound.tag = Some(ident(&mut i).to_ascii_lowercase());
        }

        while i < chars.len() {
            match chars[i] {
                '.' | '#' => {
                    let marker = chars[i];
                    i += 1;
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return Err(invalid());
                    }
                    if marker == '.' {
                        compound.classes.push(name);
                    } else {
                        compound.id = Some(name);
                    }
                }
                '[' => {
                    i += 1;
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return Err(invalid());
                    }
                    let mut value = None;
                    if i < chars.len() && chars[i] == '=' {
                        i += 1;
                        if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
                            let quote = chars[i];
                            let start = i + 1;
                            let end = chars[start..]
                                .iter()
                                .position(|c| *c == quote)
                                .map(|p| start + p)
                                .ok_or_else(invalid)?;
                            value = Some(chars[start..end].iter().collect());
                            i = end + 1;
                        } else {
                            value = Some(ident(&mut i));
                        }
                    }
                    if i >= chars.len() || chars[i] != ']' {
                        return Err(invalid());
                    }
                    i += 1;
                    compound.attrs.push((name, value));
                }
                _ => return Err(invalid()),
            }
        }
        out.push(compound);
    }
    Ok(out)
}

/// A screenshot taken by [`FakePage`].
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub path: PathBuf,
    /// Elements carrying a non-empty inline outline at capture time.
    pub outlined: Vec<(NodeKey, String)>,
    pub scroll_y: f64,
}

#[derive(Debug)]
struct PageState {
    dom: FakeDom,
    handles: HashMap<String, NodeId>,
    next_handle: u64,
    scroll_y: f64,
    scrolls: usize,
    flushes: usize,
    clicks: Vec<NodeKey>,
    screenshots: Vec<Screenshot>,
    navigations: Vec<String>,
    fail_screenshots: bool,
    /// 1-based `flush_render` calls that fail.
    failing_flushes: HashSet<usize>,
    /// Nodes whose handles report stale.
    stale: HashSet<NodeId>,
}

impl PageState {
    fn handle(&mut self, id: NodeId) -> ElementHandle {
        self.next_handle += 1;
        let remote_id = format!("fake-{}", self.next_handle);
        self.handles.insert(remote_id.clone(), id);
        ElementHandle::new(remote_id, self.dom.key(id))
    }

    fn resolve(&self, handle: &ElementHandle) -> Result<NodeId, DriverError> {
        self.handles
            .get(handle.remote_id())
            .copied()
            .filter(|id| !self.stale.contains(id))
            .ok_or_else(|| DriverError::StaleHandle(handle.remote_id().to_string()))
    }

    fn element(&self, handle: &ElementHandle) -> Result<NodeId, DriverError> {
        let id = self.resolve(handle)?;
        if self.dom.nodes[id.0].kind != NodeKind::Element {
            return Err(DriverError::Interaction(format!(
                "{} is not an element",
                handle.key()
            )));
        }
        Ok(id)
    }

    fn client_rect(&self, id: NodeId) -> Rect {
        let rect = self.dom.nodes[id.0].rect;
        Rect::new(rect.x, rect.y - self.scroll_y, rect.width, rect.height)
    }
}

/// [`PageDriver`] over a [`FakeDom`]. Clones share state.
#[derive(Debug, Clone)]
pub struct FakePage {
    id: String,
    site: Arc<HashMap<String, FakeDom>>,
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new(dom: FakeDom) -> Self {
        Self::with_site("page-1", dom, Arc::new(HashMap::new()))
    }

    fn with_site(id: &str, dom: FakeDom, site: Arc<HashMap<String, FakeDom>>) -> Self {
        Self {
            id: id.to_string(),
            site,
            state: Arc::new(Mutex::new(PageState {
                dom,
                handles: HashMap::new(),
                next_handle: 0,
                scroll_y: 0.0,
                scrolls: 0,
                flushes: 0,
                clicks: Vec::new(),
                screenshots: Vec::new(),
                navigations: Vec::new(),
                fail_screenshots: false,
                failing_flushes: HashSet::new(),
                stale: HashSet::new(),
            })),
        }
    }

    /// Handles handed out and not yet released.
    pub fn live_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn key(&self, id: NodeId) -> NodeKey {
        self.state.lock().dom.key(id)
    }

    pub fn outline(&self, id: NodeId) -> String {
        self.state.lock().dom.nodes[id.0].outline.clone()
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.state.lock().dom.nodes[id.0].attrs.get(name).cloned()
    }

    pub fn scroll_y(&self) -> f64 {
        self.state.lock().scroll_y
    }

    pub fn scroll_count(&self) -> usize {
        self.state.lock().scrolls
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }

    pub fn clicks(&self) -> Vec<NodeKey> {
        self.state.lock().clicks.clone()
    }

    pub fn screenshots(&self) -> Vec<Screenshot> {
        self.state.lock().screenshots.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn fail_screenshots(&self, fail: bool) {
        self.state.lock().fail_screenshots = fail;
    }

    /// Make the `call`-th `flush_render` (1-based) fail.
    pub fn fail_flush(&self, call: usize) {
        self.state.lock().failing_flushes.insert(call);
    }

    /// Every handle to `id`, present or future, reports stale, as a node
    /// detached by a virtualized list would. Releasing still succeeds.
    pub fn make_stale(&self, id: NodeId) {
        self.state.lock().stale.insert(id);
    }

    /// Mutate the live DOM.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut FakeDom) -> R) -> R {
        f(&mut self.state.lock().dom)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    fn page_id(&self) -> &str {
        &self.id
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        let dom = self
            .site
            .get(url)
            .cloned()
            .ok_or_else(|| DriverError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))?;
        state.dom = dom;
        state.handles.clear();
        state.scroll_y = 0.0;
        Ok(())
    }

    async fn document(&self) -> Result<ElementHandle, DriverError> {
        let mut state = self.state.lock();
        let doc = state.dom.document();
        Ok(state.handle(doc))
    }

    async fn select_all(
        &self,
        root: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let compiled = parse_selector(selector)?;
        let mut state = self.state.lock();
        let root = state.resolve(root)?;
        let scroll_y = state.scroll_y;
        let mut ids: Vec<NodeId> = state
            .dom
            .descendants(root, scroll_y)
            .into_iter()
            .filter(|id| state.dom.matches(*id, &compiled))
            .collect();
        let projected: Vec<NodeId> = state.dom.nodes[root.0]
            .projected
            .iter()
            .copied()
            .filter(|id| state.dom.is_attached(*id, scroll_y) && state.dom.matches(*id, &compiled))
            .collect();
        ids.extend(projected);
        Ok(ids.into_iter().map(|id| state.handle(id)).collect())
    }

    async fn shadow_roots(&self, root: &ElementHandle) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.lock();
        let root = state.resolve(root)?;
        let scroll_y = state.scroll_y;
        let mut hosts = vec![root];
        hosts.extend(state.dom.descendants(root, scroll_y));
        let roots: Vec<NodeId> = hosts
            .into_iter()
            .filter_map(|id| state.dom.nodes[id.0].shadow)
            .collect();
        Ok(roots.into_iter().map(|id| state.handle(id)).collect())
    }

    async fn frame_documents(
        &self,
        root: &ElementHandle,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.lock();
        let root = state.resolve(root)?;
        let scroll_y = state.scroll_y;
        let docs: Vec<NodeId> = state
            .dom
            .descendants(root, scroll_y)
            .into_iter()
            .filter_map(|id| {
                let node = &state.dom.nodes[id.0];
                if node.cross_origin { None } else { node.frame }
            })
            .collect();
        Ok(docs.into_iter().map(|id| state.handle(id)).collect())
    }

    async fn matches(&self, element: &ElementHandle, selector: &str) -> Result<bool, DriverError> {
        let compiled = parse_selector(selector)?;
        let state = self.state.lock();
        let id = state.element(element)?;
        Ok(state.dom.matches(id, &compiled))
    }

    async fn element_state(&self, element: &ElementHandle) -> Result<ElementState, DriverError> {
        let state = self.state.lock();
        let id = state.element(element)?;
        let node = &state.dom.nodes[id.0];
        Ok(ElementState {
            display: node.display.clone(),
            visibility: node.visibility.clone(),
            opacity: node.opacity.clone(),
            rect: state.client_rect(id),
        })
    }

    async fn bounding_rect(&self, element: &ElementHandle) -> Result<Rect, DriverError> {
        let state = self.state.lock();
        let id = state.element(element)?;
        Ok(state.client_rect(id))
    }

    async fn viewport(&self) -> Result<Viewport, DriverError> {
        Ok(self.state.lock().dom.viewport)
    }

    async fn set_outline(
        &self,
        element: &ElementHandle,
        outline: &str,
    ) -> Result<String, DriverError> {
        let mut state = self.state.lock();
        let id = state.element(element)?;
        Ok(std::mem::replace(
            &mut state.dom.nodes[id.0].outline,
            outline.to_string(),
        ))
    }

    async fn set_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let id = state.element(element)?;
        let attrs = &mut state.dom.nodes[id.0].attrs;
        match value {
            Some(value) => {
                attrs.insert(name.to_string(), value.to_string());
            }
            None => {
                attrs.remove(name);
            }
        }
        Ok(())
    }

    async fn flush_render(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.flushes += 1;
        if state.failing_flushes.contains(&state.flushes) {
            return Err(DriverError::Protocol("Runtime.evaluate failed".to_string()));
        }
        Ok(())
    }

    async fn scroll_by(&self, dy: f64) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.scroll_y = (state.scroll_y + dy).max(0.0);
        state.scrolls += 1;
        Ok(())
    }

    async fn scroll_to_center(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let id = state.element(element)?;
        let rect = state.dom.nodes[id.0].rect;
        let half_viewport = state.dom.viewport.height / 2.0;
        state.scroll_y = (rect.y + rect.height / 2.0 - half_viewport).max(0.0);
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let id = state.element(element)?;
        let key = state.dom.key(id);
        state.clicks.push(key);
        let reveals = state.dom.nodes[id.0].reveals.clone();
        for target in reveals {
            state.dom.nodes[target.0].attached = true;
        }
        Ok(())
    }

    async fn href(&self, element: &ElementHandle) -> Result<Option<String>, DriverError> {
        let state = self.state.lock();
        let id = state.element(element)?;
        Ok(state.dom.nodes[id.0].attrs.get("href").cloned())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.fail_screenshots {
            return Err(DriverError::Protocol("Page.captureScreenshot failed".to_string()));
        }
        let outlined = state
            .dom
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.outline.is_empty())
            .map(|(i, node)| (state.dom.key(NodeId(i)), node.outline.clone()))
            .collect();
        let scroll_y = state.scroll_y;
        state.screenshots.push(Screenshot {
            path: path.to_path_buf(),
            outlined,
            scroll_y,
        });
        Ok(())
    }

    async fn release(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state
            .handles
            .remove(element.remote_id())
            .map(|_| ())
            .ok_or_else(|| DriverError::StaleHandle(element.remote_id().to_string()))
    }
}

/// [`Browser`] serving a fixed set of URLs.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    site: Arc<HashMap<String, FakeDom>>,
    opened: Mutex<Vec<FakePage>>,
    closed: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl FakeBrowser {
    pub fn new(site: HashMap<String, FakeDom>) -> Self {
        Self {
            site: Arc::new(site),
            ..Default::default()
        }
    }

    /// Every page opened so far, in order.
    pub fn opened(&self) -> Vec<FakePage> {
        self.opened.lock().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().clone()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let blank = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
        let page = FakePage::with_site(&format!("page-{}", n), blank, self.site.clone());
        self.opened.lock().push(page.clone());
        Ok(Box::new(page))
    }

    async fn close_page(&self, page: Box<dyn PageDriver>) -> Result<(), DriverError> {
        self.closed.lock().push(page.page_id().to_string());
        Ok(())
    }
}
