//! Scroll-convergence collection.
//!
//! Infinite feeds only attach content near the viewport. [`converge`] grows
//! a collection by scrolling and re-harvesting until it either reaches the
//! requested size or stops growing for a number of consecutive rounds.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crawlset_config::ScrollConfig;

use crate::driver::PageDriver;
use crate::error::QueryError;
use crate::run_state::RunGate;

/// Scroll loop tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollTuning {
    /// Scroll distance as a fraction of the viewport height.
    pub step: f64,
    pub sleep: Duration,
    /// Consecutive rounds without growth before giving up.
    pub stable_rounds: u32,
}

impl From<&ScrollConfig> for ScrollTuning {
    fn from(config: &ScrollConfig) -> Self {
        Self {
            step: config.step,
            sleep: Duration::from_millis(config.sleep_ms),
            stable_rounds: config.stable_rounds,
        }
    }
}

impl Default for ScrollTuning {
    fn default() -> Self {
        Self::from(&ScrollConfig::default())
    }
}

/// One pass over the currently attached DOM.
#[async_trait]
pub trait Harvest: Send {
    type Item: Send;

    /// Append newly seen items to `items` and return how many were added.
    async fn harvest(
        &mut self,
        page: &dyn PageDriver,
        items: &mut Vec<Self::Item>,
    ) -> Result<usize, QueryError>;

    /// Dispose of an item cut by the size cap.
    async fn discard(&mut self, _page: &dyn PageDriver, _item: Self::Item) {}
}

/// Outcome of a [`converge`] run.
#[derive(Debug)]
pub struct ScrollSession<T> {
    pub items: Vec<T>,
    /// No-growth rounds at the end of the loop.
    pub stable_rounds: u32,
    /// Scroll rounds taken after the seed harvest.
    pub rounds: u32,
    pub max_count: usize,
    /// The loop ended on a stop signal.
    pub stopped: bool,
}

/// Grow a collection by scrolling until it holds `max_count` items or has
/// not grown for `tuning.stable_rounds` consecutive rounds.
///
/// The seed harvest runs before the first checkpoint and its errors
/// propagate; later harvest or scroll failures count as rounds without
/// growth.
pub async fn converge<H: Harvest>(
    page: &dyn PageDriver,
    gate: &mut RunGate,
    harvest: &mut H,
    tuning: &ScrollTuning,
    max_count: usize,
) -> Result<ScrollSession<H::Item>, QueryError> {
    let mut session = ScrollSession {
        items: Vec::new(),
        stable_rounds: 0,
        rounds: 0,
        max_count,
        stopped: false,
    };

    harvest.harvest(page, &mut session.items).await?;
    let viewport = page.viewport().await?;
    let distance = tuning.step * viewport.height;

    while session.items.len() < max_count && session.stable_rounds < tuning.stable_rounds {
        if gate.checkpoint().await.is_stop() {
            session.stopped = true;
            break;
        }
        session.rounds += 1;

        let grew = match page.scroll_by(distance).await {
            Ok(()) => {
                gate.sleep(tuning.sleep).await;
                let before = session.items.len();
                match harvest.harvest(page, &mut session.items).await {
                    Ok(_) => session.items.len() > before,
                    Err(e) => {
                        warn!("Harvest round {} failed: {}", session.rounds, e);
                        false
                    }
                }
            }
            Err(e) => {
                warn!("Scroll round {} failed: {}", session.rounds, e);
                false
            }
        };

        if grew {
            session.stable_rounds = 0;
        } else {
            session.stable_rounds += 1;
        }
        debug!(
            "Scroll round {}: {} items, {} stable",
            session.rounds,
            session.items.len(),
            session.stable_rounds
        );
    }

    if session.items.len() > max_count {
        let extra: Vec<H::Item> = session.items.drain(max_count..).collect();
        for item in extra {
            harvest.discard(page, item).await;
        }
    }

    info!(
        "Collected {} items in {} scroll rounds{}",
        session.items.len(),
        session.rounds,
        if session.stopped { " (stopped)" } else { "" }
    );
    Ok(session)
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod tests;
