//! Scripted collaborators for tests and the demo host
//!
//! These stand in for the platform APIs a real host would plug in:
//! - [`ScriptedProbe`]: grant states set per kind, optionally delayed
//! - [`ScriptedAction`]: fixed action outcome, optionally updating a probe
//! - [`RecordingHaptics`] / [`RecordingSettings`]: record what was played or opened
//! - [`ResolutionLog`]: counts `on_granted` / `on_dismiss` invocations

use crate::catalog::{ActionError, GrantAction, GrantProbe, GrantState, ProbeError, RequestKind, SettingsOpener};
use crate::notification::{HapticFeedback, HapticsEngine};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Probe whose answers are set by the test
///
/// Kinds without an explicit answer use the default answer.
#[derive(Debug)]
pub struct ScriptedProbe {
    default: Option<GrantState>,
    answers: Mutex<HashMap<RequestKind, Option<GrantState>>>,
    delays: Mutex<HashMap<RequestKind, Duration>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    /// Report `state` for every kind
    #[must_use]
    pub fn always(state: GrantState) -> Self {
        Self {
            default: Some(state),
            answers: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every probe
    #[must_use]
    pub fn failing() -> Self {
        Self {
            default: None,
            ..Self::always(GrantState::Undetermined)
        }
    }

    /// Report `state` for `kind` from now on (the OS state changed)
    pub fn set(&self, kind: RequestKind, state: GrantState) {
        lock(&self.answers).insert(kind, Some(state));
    }

    /// Make probes of `kind` fail from now on
    pub fn fail(&self, kind: RequestKind) {
        lock(&self.answers).insert(kind, None);
    }

    /// Delay answers for `kind` by `delay`
    #[must_use]
    pub fn with_delay(self, kind: RequestKind, delay: Duration) -> Self {
        lock(&self.delays).insert(kind, delay);
        self
    }

    /// Number of probes run
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GrantProbe for ScriptedProbe {
    fn probe(&self, kind: RequestKind) -> BoxFuture<'_, Result<GrantState, ProbeError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = lock(&self.delays).get(&kind).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let answer = lock(&self.answers).get(&kind).copied().unwrap_or(self.default);
            answer.ok_or_else(|| ProbeError {
                kind,
                reason: "scripted failure".to_string(),
            })
        })
    }
}

/// Action with a fixed outcome
#[derive(Debug)]
pub struct ScriptedAction {
    outcome: Result<bool, ()>,
    after: Mutex<Option<(Arc<ScriptedProbe>, GrantState)>>,
    calls: AtomicUsize,
}

impl ScriptedAction {
    fn with_outcome(outcome: Result<bool, ()>) -> Self {
        Self {
            outcome,
            after: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// The user grants access
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(true))
    }

    /// The user refuses access
    #[must_use]
    pub fn declining() -> Self {
        Self::with_outcome(Ok(false))
    }

    /// The action cannot run
    #[must_use]
    pub fn failing() -> Self {
        Self::with_outcome(Err(()))
    }

    /// After running, report `state` from `probe` for the kind acted on
    ///
    /// Models the OS recording the user's answer.
    #[must_use]
    pub fn then_probe_reports(self, probe: Arc<ScriptedProbe>, state: GrantState) -> Self {
        *lock(&self.after) = Some((probe, state));
        self
    }

    /// Number of actions run
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GrantAction for ScriptedAction {
    fn perform(&self, kind: RequestKind) -> BoxFuture<'_, Result<bool, ActionError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some((probe, state)) = lock(&self.after).as_ref() {
                probe.set(kind, *state);
            }

            self.outcome.map_err(|()| ActionError {
                kind,
                reason: "scripted failure".to_string(),
            })
        })
    }
}

/// Haptics engine that records every feedback played
#[derive(Debug, Default)]
pub struct RecordingHaptics {
    played: Mutex<Vec<HapticFeedback>>,
}

impl RecordingHaptics {
    /// Creates a new `RecordingHaptics`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feedback played so far, in order
    #[must_use]
    pub fn played(&self) -> Vec<HapticFeedback> {
        lock(&self.played).clone()
    }
}

impl HapticsEngine for RecordingHaptics {
    fn play(&self, feedback: HapticFeedback) {
        tracing::trace!(?feedback, "Haptic played");
        lock(&self.played).push(feedback);
    }
}

/// Settings opener that counts how often it was used
#[derive(Debug, Default)]
pub struct RecordingSettings {
    opened: AtomicUsize,
}

impl RecordingSettings {
    /// Creates a new `RecordingSettings`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times Settings was opened
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SettingsOpener for RecordingSettings {
    fn open_settings(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Counts callback invocations of capability requests
#[derive(Debug, Clone, Default)]
pub struct ResolutionLog {
    granted: Arc<AtomicUsize>,
    dismissed: Arc<AtomicUsize>,
}

impl ResolutionLog {
    /// Creates a new `ResolutionLog`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to pass as `on_granted`
    #[must_use]
    pub fn granted_callback(&self) -> impl FnOnce() + Send + 'static {
        let granted = Arc::clone(&self.granted);
        move || {
            granted.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Callback to pass as `on_dismiss`
    #[must_use]
    pub fn dismissed_callback(&self) -> impl FnOnce() + Send + 'static {
        let dismissed = Arc::clone(&self.dismissed);
        move || {
            dismissed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// `on_granted` invocations
    #[must_use]
    pub fn granted(&self) -> usize {
        self.granted.load(Ordering::SeqCst)
    }

    /// `on_dismiss` invocations
    #[must_use]
    pub fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}
