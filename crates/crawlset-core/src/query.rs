//! Deep DOM queries across open shadow roots and same-origin iframes.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::{release_all, ElementHandle, NodeKey, PageDriver};
use crate::error::{DriverError, QueryError};
use crate::visibility::is_visible;

/// Interval between polls in [`DeepQuery::wait_for_any`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A way of resolving a selector against a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Full traversal through shadow roots and, optionally, iframes.
    Deep {
        selector: String,
        include_iframes: bool,
    },
    /// `querySelectorAll` on the root only.
    Light { selector: String },
}

impl Strategy {
    pub fn selector(&self) -> &str {
        match self {
            Strategy::Deep { selector, .. } | Strategy::Light { selector } => selector,
        }
    }

    /// Deep traversal, falling back to the root's own tree.
    pub fn cascade(selector: &str, include_iframes: bool) -> Vec<Strategy> {
        vec![
            Strategy::Deep {
                selector: selector.to_string(),
                include_iframes,
            },
            Strategy::Light {
                selector: selector.to_string(),
            },
        ]
    }
}

#[derive(Default)]
struct Walk {
    found: Vec<ElementHandle>,
    seen: HashSet<NodeKey>,
    visited: HashSet<NodeKey>,
    /// Shadow roots and frame documents opened during the walk.
    acquired: Vec<ElementHandle>,
}

/// Query engine bound to one page.
#[derive(Clone, Copy)]
pub struct DeepQuery<'a> {
    page: &'a dyn PageDriver,
}

impl<'a> DeepQuery<'a> {
    pub fn new(page: &'a dyn PageDriver) -> Self {
        Self { page }
    }

    /// Every element matching `selector` under `root`, across open shadow
    /// roots and (when `include_iframes`) same-origin iframe documents.
    ///
    /// Results are unique by node and ordered by first encounter in a
    /// depth-first walk: a root's own matches, then its shadow trees, then
    /// its frame documents. The caller owns the returned handles; `root`
    /// is never released.
    pub async fn query_all(
        &self,
        root: &ElementHandle,
        selector: &str,
        include_iframes: bool,
    ) -> Result<Vec<ElementHandle>, QueryError> {
        let mut walk = Walk::default();
        let result = self.walk(root, selector, include_iframes, &mut walk).await;

        release_all(self.page, std::mem::take(&mut walk.acquired)).await;
        match result {
            Ok(()) => Ok(walk.found),
            Err(e) => {
                release_all(self.page, walk.found).await;
                Err(e)
            }
        }
    }

    async fn walk(
        &self,
        root: &ElementHandle,
        selector: &str,
        include_iframes: bool,
        walk: &mut Walk,
    ) -> Result<(), QueryError> {
        let mut documents = vec![root.clone()];
        while let Some(document) = documents.pop() {
            let frames = self.walk_tree(&document, selector, include_iframes, walk).await?;
            documents.extend(frames.into_iter().rev());
        }
        Ok(())
    }

    /// Walk one document and its shadow trees, returning the frame
    /// documents found along the way.
    async fn walk_tree(
        &self,
        document: &ElementHandle,
        selector: &str,
        include_iframes: bool,
        walk: &mut Walk,
    ) -> Result<Vec<ElementHandle>, QueryError> {
        let mut frames = Vec::new();
        let mut roots = vec![document.clone()];

        while let Some(root) = roots.pop() {
            if !walk.visited.insert(root.key()) {
                continue;
            }

            for handle in self.page.select_all(&root, selector).await? {
                if walk.seen.insert(handle.key()) {
                    walk.found.push(handle);
                } else {
                    release_all(self.page, [handle]).await;
                }
            }

            let shadows = self.page.shadow_roots(&root).await?;
            walk.acquired.extend(shadows.iter().cloned());
            roots.extend(shadows.into_iter().rev());

            if include_iframes {
                let documents = self.page.frame_documents(&root).await?;
                walk.acquired.extend(documents.iter().cloned());
                frames.extend(documents);
            }
        }

        Ok(frames)
    }

    /// [`query_all`](Self::query_all) restricted to elements that are
    /// rendered and intersect the viewport.
    pub async fn query_visible(
        &self,
        root: &ElementHandle,
        selector: &str,
        include_iframes: bool,
    ) -> Result<Vec<ElementHandle>, QueryError> {
        let handles = self.query_all(root, selector, include_iframes).await?;
        if handles.is_empty() {
            return Ok(handles);
        }

        let viewport = match self.page.viewport().await {
            Ok(viewport) => viewport,
            Err(e) => {
                release_all(self.page, handles).await;
                return Err(e.into());
            }
        };

        let mut visible = Vec::with_capacity(handles.len());
        for handle in handles {
            let keep = match self.page.element_state(&handle).await {
                Ok(state) => is_visible(&state, &viewport),
                Err(e) => {
                    debug!("Dropping {} from visible set: {}", handle.key(), e);
                    false
                }
            };
            if keep {
                visible.push(handle);
            } else {
                release_all(self.page, [handle]).await;
            }
        }
        Ok(visible)
    }

    /// Poll until `selector` matches something or `timeout` elapses.
    ///
    /// A timeout yields an empty result rather than an error.
    pub async fn wait_for_any(
        &self,
        root: &ElementHandle,
        selector: &str,
        include_iframes: bool,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, QueryError> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.query_all(root, selector, include_iframes).await?;
            if !found.is_empty() {
                return Ok(found);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("No match for '{}' within {:?}", selector, timeout);
                return Ok(found);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Try `strategies` in order and return the first non-empty result.
    ///
    /// Invalid selectors and stale roots move on to the next strategy. When
    /// every strategy failed that way the last error is returned.
    pub async fn resolve_first(
        &self,
        root: &ElementHandle,
        strategies: &[Strategy],
    ) -> Result<Vec<ElementHandle>, QueryError> {
        let mut last_error = None;
        let mut any_succeeded = false;

        for strategy in strategies {
            let result = match strategy {
                Strategy::Deep {
                    selector,
                    include_iframes,
                } => self.query_all(root, selector, *include_iframes).await,
                Strategy::Light { selector } => self
                    .page
                    .select_all(root, selector)
                    .await
                    .map_err(QueryError::from),
            };

            match result {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => any_succeeded = true,
                Err(e) if is_recoverable(&e) => {
                    warn!("Query strategy {:?} failed: {}", strategy, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) if !any_succeeded => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

fn is_recoverable(error: &QueryError) -> bool {
    matches!(
        error,
        QueryError::Selector { .. } | QueryError::Driver(DriverError::StaleHandle(_))
    )
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
