//! Scene lifecycle phase source.
//!
//! The host reports phase transitions through [`LifecycleGate::transition`].
//! Only real changes are published; the hub turns each one into a
//! `PhaseChanged` reconciliation action for the arbiter and the notification
//! queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Foreground state of the app's scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Visible and receiving input
    #[default]
    Active,
    /// Visible but not receiving input (system sheet, app switcher)
    Inactive,
    /// Not visible
    Background,
}

impl LifecyclePhase {
    /// Whether the scene is in the foreground and interactive
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
            Self::Background => f.write_str("background"),
        }
    }
}

/// Process-wide phase holder
#[derive(Debug, Clone)]
pub struct LifecycleGate {
    sender: watch::Sender<LifecyclePhase>,
}

impl LifecycleGate {
    /// Create a gate starting in `initial`
    #[must_use]
    pub fn new(initial: LifecyclePhase) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        *self.sender.borrow()
    }

    /// Record a transition; returns the previous phase if it changed
    ///
    /// Repeating the current phase is ignored and returns `None`.
    pub fn transition(&self, phase: LifecyclePhase) -> Option<LifecyclePhase> {
        let mut previous = None;
        self.sender.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            previous = Some(*current);
            *current = phase;
            true
        });

        if let Some(from) = previous {
            tracing::debug!(%from, to = %phase, "Lifecycle transition");
        }
        previous
    }

    /// Watch phase changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
        self.sender.subscribe()
    }
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new(LifecyclePhase::default())
    }
}
