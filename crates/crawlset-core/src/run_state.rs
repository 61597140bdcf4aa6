//! Cooperative run-state control.
//!
//! A single [`RunStateController`] owns the process-wide state. Any number
//! of clones (keyboard listener, Ctrl-C handler) send [`Signal`]s; long
//! loops hold a [`RunGate`] and call [`RunGate::checkpoint`] between units
//! of work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Crawl run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for the first start signal.
    Idle,
    Running,
    Paused,
    /// Terminal.
    Stopped,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Running => write!(f, "RUNNING"),
            RunState::Paused => write!(f, "PAUSED"),
            RunState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Leave `Idle`.
    Start,
    /// Flip between running and paused.
    Toggle,
    /// End the run from any state.
    Stop,
}

impl RunState {
    /// State after applying `signal`. Signals that do not apply leave the
    /// state unchanged.
    pub fn apply(self, signal: Signal) -> RunState {
        match (self, signal) {
            (RunState::Stopped, _) => RunState::Stopped,
            (_, Signal::Stop) => RunState::Stopped,
            (RunState::Idle, Signal::Start) => RunState::Running,
            (RunState::Running, Signal::Toggle) => RunState::Paused,
            (RunState::Paused, Signal::Toggle) => RunState::Running,
            (state, _) => state,
        }
    }
}

/// What a loop should do after a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        self == Flow::Stop
    }
}

/// Owner of the run state.
#[derive(Clone)]
pub struct RunStateController {
    sender: Arc<watch::Sender<RunState>>,
    cancel: CancellationToken,
}

impl RunStateController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(RunState::Idle);
        Self {
            sender: Arc::new(sender),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RunState {
        *self.sender.borrow()
    }

    /// Apply a signal atomically and return the resulting state.
    pub fn signal(&self, signal: Signal) -> RunState {
        let mut transition = None;
        self.sender.send_if_modified(|state| {
            let next = state.apply(signal);
            if next == *state {
                return false;
            }
            transition = Some((*state, next));
            *state = next;
            true
        });

        match transition {
            Some((from, to)) => {
                info!("Run state {} -> {}", from, to);
                if to == RunState::Stopped {
                    self.cancel.cancel();
                }
                to
            }
            None => {
                let state = self.state();
                debug!("Ignoring {:?} in state {}", signal, state);
                state
            }
        }
    }

    pub fn start(&self) -> RunState {
        self.signal(Signal::Start)
    }

    pub fn toggle(&self) -> RunState {
        self.signal(Signal::Toggle)
    }

    pub fn stop(&self) -> RunState {
        self.signal(Signal::Stop)
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::Stopped
    }

    /// Token cancelled when the run stops.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn gate(&self) -> RunGate {
        RunGate {
            receiver: self.sender.subscribe(),
            cancel: self.cancel.clone(),
        }
    }
}

impl Default for RunStateController {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the run state.
pub struct RunGate {
    receiver: watch::Receiver<RunState>,
    cancel: CancellationToken,
}

impl RunGate {
    /// Wait while idle or paused; report whether to keep going.
    pub async fn checkpoint(&mut self) -> Flow {
        loop {
            let state = *self.receiver.borrow_and_update();
            match state {
                RunState::Running => return Flow::Continue,
                RunState::Stopped => return Flow::Stop,
                RunState::Idle | RunState::Paused => {
                    debug!("Run gate waiting in state {}", state);
                    if self.receiver.changed().await.is_err() {
                        return Flow::Stop;
                    }
                }
            }
        }
    }

    /// Sleep for `duration`, waking early on stop. Returns `false` when
    /// interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
#[path = "run_state_tests.rs"]
mod tests;
