//! Positive-action counter that decides when to ask for an app rating.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Persistable progress of a [`RatingGate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RatingProgress {
    /// Positive actions recorded so far
    pub positive_actions: u32,
    /// Whether the system review prompt has been shown
    pub prompted: bool,
}

/// Counts positive actions and fires once when the threshold is reached
///
/// Firing is suppressed after the user was prompted, and the gate fires at
/// most once until [`reset`](Self::reset).
#[derive(Debug)]
pub struct RatingGate {
    threshold: u32,
    positive_actions: AtomicU32,
    fired: AtomicBool,
    prompted: AtomicBool,
}

impl RatingGate {
    /// Create a gate that fires after `threshold` positive actions
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold,
            positive_actions: AtomicU32::new(0),
            fired: AtomicBool::new(false),
            prompted: AtomicBool::new(false),
        }
    }

    /// Restore a gate from saved progress
    #[must_use]
    pub const fn restore(threshold: u32, progress: RatingProgress) -> Self {
        Self {
            threshold,
            positive_actions: AtomicU32::new(progress.positive_actions),
            fired: AtomicBool::new(progress.prompted),
            prompted: AtomicBool::new(progress.prompted),
        }
    }

    /// Record a positive action; `true` when an app-rating request should be emitted
    pub fn record_positive_action(&self) -> bool {
        let count = self
            .positive_actions
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);

        if count < self.threshold || self.prompted.load(Ordering::SeqCst) {
            return false;
        }

        let fire = !self.fired.swap(true, Ordering::SeqCst);
        if fire {
            tracing::debug!(count, threshold = self.threshold, "Positive action threshold reached");
        }
        fire
    }

    /// Whether an app-rating request may show its sheet now
    ///
    /// Open once the threshold is reached, until the user has been prompted.
    #[must_use]
    pub fn allows_prompt(&self) -> bool {
        self.positive_actions.load(Ordering::SeqCst) >= self.threshold
            && !self.prompted.load(Ordering::SeqCst)
    }

    /// The review prompt was shown
    pub fn mark_prompted(&self) {
        self.prompted.store(true, Ordering::SeqCst);
    }

    /// Clear counter and flags
    pub fn reset(&self) {
        self.positive_actions.store(0, Ordering::SeqCst);
        self.fired.store(false, Ordering::SeqCst);
        self.prompted.store(false, Ordering::SeqCst);
        tracing::debug!("Rating gate reset");
    }

    /// Snapshot for persistence
    #[must_use]
    pub fn progress(&self) -> RatingProgress {
        RatingProgress {
            positive_actions: self.positive_actions.load(Ordering::SeqCst),
            prompted: self.prompted.load(Ordering::SeqCst),
        }
    }
}
