//! Per-layer load state machine.
//!
//! The render collaborator reports load events; the machine decides the next
//! status and whether the caller should apply the fallback reconfiguration.
//! It performs no I/O and owns no layer, so it is driven the same way from
//! tests and from the engine's event pump.
//!
//! A failure that still has retry budget reports `Retrying` directly. `Error`
//! is only reported once no retry remains, so it always means a settled layer.

use std::time::{Duration, Instant};

use super::base::LoadingStatus;
use crate::core::constants::LOAD_RETRY_BUDGET;

/// A load event reported for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEvent {
    /// A tile or image request started.
    Start,
    /// A tile or image request finished successfully.
    Loaded,
    /// A tile or image request failed.
    Failed,
}

/// Outcome of feeding one event to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: LoadingStatus,
    /// Swap the layer to its compatibility parameters before the next request.
    pub apply_fallback: bool,
    /// Set when this event completed a load.
    pub load_time: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LoadLifecycle {
    status: LoadingStatus,
    retry_budget: u32,
    retries_used: u32,
    started_at: Option<Instant>,
    last_load_time: Option<Duration>,
}

impl Default for LoadLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadLifecycle {
    pub fn new() -> Self {
        Self::with_retry_budget(LOAD_RETRY_BUDGET)
    }

    pub fn with_retry_budget(retry_budget: u32) -> Self {
        Self {
            status: LoadingStatus::Pending,
            retry_budget,
            retries_used: 0,
            started_at: None,
            last_load_time: None,
        }
    }

    pub fn status(&self) -> LoadingStatus {
        self.status
    }

    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    pub fn last_load_time(&self) -> Option<Duration> {
        self.last_load_time
    }

    /// Whether the retry budget is spent and the layer failed for good.
    pub fn is_exhausted(&self) -> bool {
        self.status == LoadingStatus::Error && self.retries_used >= self.retry_budget
    }

    pub fn on_event(&mut self, event: LoadEvent, at: Instant) -> Transition {
        let mut apply_fallback = false;
        let mut load_time = None;

        if self.is_exhausted() {
            return self.transition(apply_fallback, load_time);
        }

        match event {
            LoadEvent::Start => {
                self.started_at = Some(at);
                // A retry stays visible as such until it settles.
                if self.status != LoadingStatus::Retrying {
                    self.status = LoadingStatus::Loading;
                }
            }
            LoadEvent::Loaded => {
                let elapsed = self
                    .started_at
                    .take()
                    .map(|started| at.saturating_duration_since(started))
                    .unwrap_or_default();
                self.last_load_time = Some(elapsed);
                load_time = Some(elapsed);
                self.status = LoadingStatus::Loaded;
            }
            LoadEvent::Failed => {
                self.started_at = None;
                if self.retries_used < self.retry_budget {
                    self.retries_used += 1;
                    self.status = LoadingStatus::Retrying;
                    apply_fallback = true;
                } else {
                    self.status = LoadingStatus::Error;
                }
            }
        }

        self.transition(apply_fallback, load_time)
    }

    fn transition(&self, apply_fallback: bool, load_time: Option<Duration>) -> Transition {
        Transition {
            status: self.status,
            apply_fallback,
            load_time,
        }
    }
}
