//! Harvest passes for the scroll collector: capture targets and links.

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crawlset_config::LinksConfig;

use crate::collector::Harvest;
use crate::driver::{release_all, ElementHandle, HandleScope, NodeKey, PageDriver};
use crate::error::{DriverError, QueryError};
use crate::query::{DeepQuery, Strategy};

/// Run `selectors` against the document, skipping selectors that fail.
///
/// Fails only when every selector failed.
async fn query_selectors(
    page: &dyn PageDriver,
    root: &ElementHandle,
    selectors: &[String],
    include_iframes: bool,
) -> Result<Vec<ElementHandle>, QueryError> {
    let query = DeepQuery::new(page);
    let mut found = Vec::new();
    let mut last_error = None;
    let mut any_succeeded = false;

    for selector in selectors {
        match query
            .resolve_first(root, &Strategy::cascade(selector, include_iframes))
            .await
        {
            Ok(handles) => {
                any_succeeded = true;
                found.extend(handles);
            }
            Err(e) => {
                warn!("Target selector '{}' failed: {}", selector, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if !any_succeeded => Err(e),
        _ => Ok(found),
    }
}

/// Collects capture targets, unique by node.
pub struct TargetHarvest {
    selectors: Vec<String>,
    include_iframes: bool,
    seen: HashSet<NodeKey>,
}

impl TargetHarvest {
    pub fn new(selectors: Vec<String>, include_iframes: bool) -> Self {
        Self {
            selectors,
            include_iframes,
            seen: HashSet::new(),
        }
    }
}

#[async_trait]
impl Harvest for TargetHarvest {
    type Item = ElementHandle;

    async fn harvest(
        &mut self,
        page: &dyn PageDriver,
        items: &mut Vec<ElementHandle>,
    ) -> Result<usize, QueryError> {
        let mut scope = HandleScope::new(page);
        let document = scope.adopt(page.document().await?);
        let result = query_selectors(page, &document, &self.selectors, self.include_iframes).await;
        scope.close().await;

        let mut added = 0;
        for handle in result? {
            if self.seen.insert(handle.key()) {
                items.push(handle);
                added += 1;
            } else {
                release_all(page, [handle]).await;
            }
        }
        Ok(added)
    }

    async fn discard(&mut self, page: &dyn PageDriver, item: ElementHandle) {
        release_all(page, [item]).await;
    }
}

/// One step of the per-element URL resolver chain.
#[derive(Debug, Clone)]
pub enum LinkStrategy {
    /// `href` of the first element matching the selector inside the target.
    OpenSelector(String),
    /// First anchor whose `href` matches the pattern.
    CommentsPattern(Regex),
    /// First anchor with an `href`.
    FirstAnchor,
}

impl LinkStrategy {
    /// The resolver chain for a links configuration.
    pub fn chain(config: &LinksConfig) -> Result<Vec<LinkStrategy>, regex::Error> {
        let mut chain = Vec::new();
        if let Some(selector) = config.open_selector.as_deref().filter(|s| !s.trim().is_empty()) {
            chain.push(LinkStrategy::OpenSelector(selector.to_string()));
        }
        if let Some(pattern) = &config.comments_pattern {
            chain.push(LinkStrategy::CommentsPattern(Regex::new(pattern)?));
        }
        chain.push(LinkStrategy::FirstAnchor);
        Ok(chain)
    }
}

/// Normalize an `href` into a followable absolute URL.
fn normalize_link(href: &str) -> Option<String> {
    let mut url = Url::parse(href.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

async fn first_href(
    page: &dyn PageDriver,
    candidates: &[ElementHandle],
    accept: impl Fn(&str) -> bool + Send + Sync,
) -> Option<String> {
    for candidate in candidates {
        match page.href(candidate).await {
            Ok(Some(href)) => {
                if let Some(url) = normalize_link(&href).filter(|u| accept(u)) {
                    return Some(url);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Reading href of {} failed: {}", candidate.key(), e),
        }
    }
    None
}

/// Resolve the URL a target element leads to, trying `chain` in order.
pub async fn resolve_link(
    page: &dyn PageDriver,
    element: &ElementHandle,
    chain: &[LinkStrategy],
) -> Result<Option<String>, QueryError> {
    let query = DeepQuery::new(page);

    for strategy in chain {
        let (selector, pattern) = match strategy {
            LinkStrategy::OpenSelector(selector) => (selector.as_str(), None),
            LinkStrategy::CommentsPattern(pattern) => ("a[href]", Some(pattern)),
            LinkStrategy::FirstAnchor => ("a[href]", None),
        };

        let candidates = match query.query_all(element, selector, false).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_selector() => {
                warn!("Link strategy {:?} failed: {}", strategy, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let candidates = match strategy {
            LinkStrategy::OpenSelector(_) => candidates,
            // The target itself may be the anchor.
            _ => {
                let mut all = candidates;
                if page.matches(element, "a[href]").await.unwrap_or(false) {
                    all.insert(0, element.clone());
                }
                all
            }
        };

        let url = first_href(page, &candidates, |u| pattern.is_none_or(|p| p.is_match(u))).await;
        release_all(
            page,
            candidates.into_iter().filter(|c| c.remote_id() != element.remote_id()),
        )
        .await;

        if url.is_some() {
            return Ok(url);
        }
    }
    Ok(None)
}

/// Collects followable URLs, unique and in discovery order.
pub struct LinkHarvest {
    selectors: Vec<String>,
    include_iframes: bool,
    chain: Vec<LinkStrategy>,
    seen: HashSet<String>,
}

impl LinkHarvest {
    pub fn new(selectors: Vec<String>, include_iframes: bool, chain: Vec<LinkStrategy>) -> Self {
        Self {
            selectors,
            include_iframes,
            chain,
            seen: HashSet::new(),
        }
    }

    pub fn from_config(config: &LinksConfig, include_iframes: bool) -> Result<Self, regex::Error> {
        Ok(Self::new(
            config.targets.clone(),
            include_iframes,
            LinkStrategy::chain(config)?,
        ))
    }
}

#[async_trait]
impl Harvest for LinkHarvest {
    type Item = String;

    async fn harvest(
        &mut self,
        page: &dyn PageDriver,
        items: &mut Vec<String>,
    ) -> Result<usize, QueryError> {
        let mut scope = HandleScope::new(page);
        let document = scope.adopt(page.document().await?);
        let targets =
            query_selectors(page, &document, &self.selectors, self.include_iframes).await;
        scope.close().await;
        let targets = targets?;

        let mut added = 0;
        let mut result = Ok(());
        for target in &targets {
            match resolve_link(page, target, &self.chain).await {
                Ok(Some(url)) => {
                    if self.seen.insert(url.clone()) {
                        debug!("Link found: {}", url);
                        items.push(url);
                        added += 1;
                    }
                }
                Ok(None) => {}
                Err(QueryError::Driver(DriverError::Closed)) => {
                    result = Err(QueryError::Driver(DriverError::Closed));
                    break;
                }
                Err(e) => warn!("Skipping link target {}: {}", target.key(), e),
            }
        }
        release_all(page, targets).await;
        result.map(|()| added)
    }
}

#[cfg(test)]
#[path = "harvest_tests.rs"]
mod tests;
