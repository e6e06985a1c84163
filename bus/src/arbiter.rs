//! Capability request arbitration.
//!
//! The arbiter owns a single slot for the request whose UI is visible. Each
//! incoming request gets a monotonically increasing [`Ticket`]; only the
//! latest ticket may be staged, so the last request wins. Every request is
//! resolved at most once through its [`Completion`], which consumes the
//! producer's callbacks.
//!
//! ```text
//! Requested ──probe──▶ Probed ─┬─ granted ──────────────▶ on_granted
//!                              └─ denied/undetermined ──▶ presenting
//! presenting ─ Accept ─▶ action ─┬─ ok ───────────────────▶ on_granted
//!                                └─ failed ─▶ re-probe ─▶ presenting / on_granted
//! presenting ─ Dismiss | Background | settings opened ───▶ on_dismiss
//! ```

use crate::catalog::{Catalog, GrantState, RequestKind, RequestMetadata, SETTINGS_CTA, SettingsOpener};
use crate::lifecycle::LifecyclePhase;
use crate::rating::RatingGate;
use promptbus_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked when a request resolves
pub type Callback = Box<dyn FnOnce() + Send>;

/// How a request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Access is available
    Granted,
    /// The user declined or the request was abandoned
    Dismissed,
}

#[derive(Default)]
struct Callbacks {
    on_granted: Option<Callback>,
    on_dismiss: Option<Callback>,
}

/// One-shot completion handle shared by all clones of a request
///
/// The first [`resolve`](Self::resolve) takes the callbacks out and runs the
/// matching one; later calls do nothing.
#[derive(Clone)]
pub struct Completion {
    callbacks: Arc<Mutex<Option<Callbacks>>>,
}

impl Completion {
    fn new() -> Self {
        Self {
            callbacks: Arc::new(Mutex::new(Some(Callbacks::default()))),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Callbacks)) {
        if let Some(callbacks) = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            f(callbacks);
        }
    }

    /// Resolve the request; `false` if it was already resolved
    pub fn resolve(&self, resolution: Resolution) -> bool {
        let taken = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(callbacks) = taken else {
            return false;
        };

        let callback = match resolution {
            Resolution::Granted => callbacks.on_granted,
            Resolution::Dismissed => callbacks.on_dismiss,
        };
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    /// Whether [`resolve`](Self::resolve) has run
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A producer's request for a capability
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    /// What is being asked for
    pub kind: RequestKind,
    completion: Completion,
}

impl CapabilityRequest {
    /// Request `kind` with no callbacks
    #[must_use]
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            completion: Completion::new(),
        }
    }

    /// Run `callback` if access is obtained
    #[must_use]
    pub fn on_granted(self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.completion
            .update(|callbacks| callbacks.on_granted = Some(Box::new(callback)));
        self
    }

    /// Run `callback` if the request is declined or abandoned
    #[must_use]
    pub fn on_dismiss(self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.completion
            .update(|callbacks| callbacks.on_dismiss = Some(Box::new(callback)));
        self
    }

    /// Completion handle of this request
    #[must_use]
    pub const fn completion(&self) -> &Completion {
        &self.completion
    }
}

/// Arbitration order of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(u64);

impl Ticket {
    /// Raw ticket number
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Ticket {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What accepting the presented request does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallToAction {
    /// Run the kind's action (OS consent flow)
    Primary,
    /// Open the Settings app; always resolves as a dismissal
    OpenSettings,
}

/// The request currently holding the UI slot
#[derive(Debug, Clone)]
pub struct ActiveRequest {
    /// Ticket of the request
    pub ticket: Ticket,
    /// Request being presented
    pub request: CapabilityRequest,
    /// Bound call-to-action
    pub cta: CallToAction,
    /// The scene left the foreground since the last probe
    pub stale: bool,
    /// An accept is in flight
    pub accepting: bool,
}

/// Renderer-facing view of the active request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    /// Ticket to pass back to `accept` / `dismiss`
    pub ticket: Ticket,
    /// Kind being requested
    pub kind: RequestKind,
    /// Symbol and copy
    pub metadata: &'static RequestMetadata,
    /// Bound call-to-action
    pub cta: CallToAction,
    /// Button text for `cta`
    pub cta_text: &'static str,
    /// Button text for declining
    pub dismiss_text: &'static str,
    /// Grant status may be outdated
    pub stale: bool,
    /// An accept is in flight
    pub accepting: bool,
}

impl From<&ActiveRequest> for Presentation {
    fn from(active: &ActiveRequest) -> Self {
        let metadata = active.request.kind.metadata();
        Self {
            ticket: active.ticket,
            kind: active.request.kind,
            metadata,
            cta: active.cta,
            cta_text: match active.cta {
                CallToAction::Primary => metadata.cta,
                CallToAction::OpenSettings => SETTINGS_CTA,
            },
            dismiss_text: metadata.dismiss,
            stale: active.stale,
            accepting: active.accepting,
        }
    }
}

/// Arbiter state: the single active slot plus ticket bookkeeping
#[derive(Debug, Clone, Default)]
pub struct ArbiterState {
    /// Highest ticket issued so far
    pub latest_ticket: u64,
    /// Request whose UI is visible
    pub active: Option<ActiveRequest>,
    /// Last phase reported by the lifecycle gate
    pub phase: LifecyclePhase,
}

impl ArbiterState {
    /// View of the active request, if any
    #[must_use]
    pub fn presentation(&self) -> Option<Presentation> {
        self.active.as_ref().map(Presentation::from)
    }

    fn active_mut(&mut self, ticket: Ticket) -> Option<&mut ActiveRequest> {
        self.active.as_mut().filter(|active| active.ticket == ticket)
    }

    fn take_active(&mut self, ticket: Ticket) -> Option<ActiveRequest> {
        if self.active.as_ref().is_some_and(|active| active.ticket == ticket) {
            self.active.take()
        } else {
            None
        }
    }
}

/// Actions for the arbiter
#[derive(Debug, Clone)]
pub enum ArbiterAction {
    /// A producer submitted a request (from the bus)
    Requested(CapabilityRequest),
    /// Initial probe finished
    Probed {
        /// Ticket assigned on arrival
        ticket: Ticket,
        /// The probed request
        request: CapabilityRequest,
        /// Probe result
        state: GrantState,
    },
    /// Renderer: the user pressed the call-to-action
    Accept {
        /// Presented ticket
        ticket: Ticket,
    },
    /// The kind's action finished
    ActionCompleted {
        /// Ticket the action ran for
        ticket: Ticket,
        /// Whether access was obtained
        granted: bool,
    },
    /// The Settings app was opened
    SettingsOpened {
        /// Ticket the settings CTA belonged to
        ticket: Ticket,
    },
    /// A follow-up probe (after a failed action or on foreground) finished
    Reprobed {
        /// Ticket re-probed
        ticket: Ticket,
        /// Probe result
        state: GrantState,
        /// Issued by a failed action rather than a return to foreground
        after_action: bool,
    },
    /// Renderer: the user declined
    Dismiss {
        /// Presented ticket
        ticket: Ticket,
    },
    /// The scene lifecycle changed
    PhaseChanged(LifecyclePhase),
}

/// Dependencies of the arbiter
#[derive(Clone)]
pub struct ArbiterEnvironment {
    /// Probes and actions per kind
    pub catalog: Arc<Catalog>,
    /// Settings deep-link collaborator
    pub settings: Arc<dyn SettingsOpener>,
    /// Marked when the review prompt runs
    pub rating: Arc<RatingGate>,
}

impl ArbiterEnvironment {
    /// Creates a new `ArbiterEnvironment`
    #[must_use]
    pub const fn new(
        catalog: Arc<Catalog>,
        settings: Arc<dyn SettingsOpener>,
        rating: Arc<RatingGate>,
    ) -> Self {
        Self {
            catalog,
            settings,
            rating,
        }
    }
}

type Effects = SmallVec<[Effect<ArbiterAction>; 4]>;

/// Reducer for capability arbitration
#[derive(Clone, Debug, Default)]
pub struct ArbiterReducer;

impl ArbiterReducer {
    /// Creates a new `ArbiterReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resolve(request: &CapabilityRequest, resolution: Resolution) -> Effects {
        match resolution {
            Resolution::Granted => metrics::counter!("arbiter.requests.granted").increment(1),
            Resolution::Dismissed => metrics::counter!("arbiter.requests.dismissed").increment(1),
        }
        let completion = request.completion.clone();
        smallvec![Effect::fire_and_forget(async move {
            completion.resolve(resolution);
        })]
    }

    fn probe(
        env: &ArbiterEnvironment,
        ticket: Ticket,
        kind: RequestKind,
        after_action: bool,
    ) -> Effect<ArbiterAction> {
        let catalog = Arc::clone(&env.catalog);
        Effect::task(async move {
            let state = catalog.grant_state(kind).await;
            Some(ArbiterAction::Reprobed {
                ticket,
                state,
                after_action,
            })
        })
    }

    fn stale_ticket(ticket: Ticket, hook: &'static str) -> Effects {
        tracing::debug!(%ticket, hook, "Ignoring hook for ticket that is no longer active");
        SmallVec::new()
    }

    fn on_requested(
        state: &mut ArbiterState,
        request: CapabilityRequest,
        env: &ArbiterEnvironment,
    ) -> Effects {
        state.latest_ticket += 1;
        let ticket = Ticket(state.latest_ticket);
        let kind = request.kind;
        metrics::counter!("arbiter.requests.total").increment(1);
        tracing::debug!(%ticket, %kind, "Capability requested");

        // The rating gate stands in for a probe: a closed gate resolves like
        // granted access, without showing the sheet.
        if kind.skips_probe() {
            let grant = if env.rating.allows_prompt() {
                GrantState::Undetermined
            } else {
                tracing::debug!(%ticket, %kind, "Rating gate closed, not showing prompt");
                GrantState::Granted
            };
            return Self::on_probed(state, ticket, request, grant);
        }

        let catalog = Arc::clone(&env.catalog);
        smallvec![Effect::task(async move {
            let state = catalog.grant_state(kind).await;
            Some(ArbiterAction::Probed {
                ticket,
                request,
                state,
            })
        })]
    }

    fn on_probed(
        state: &mut ArbiterState,
        ticket: Ticket,
        request: CapabilityRequest,
        grant: GrantState,
    ) -> Effects {
        let kind = request.kind;

        if grant == GrantState::Granted {
            tracing::debug!(%ticket, %kind, "Already granted, resolving without UI");
            metrics::counter!("arbiter.requests.auto_granted").increment(1);
            return Self::resolve(&request, Resolution::Granted);
        }

        if ticket.0 != state.latest_ticket {
            tracing::debug!(%ticket, %kind, latest = state.latest_ticket, "Discarding superseded request");
            metrics::counter!("arbiter.requests.superseded").increment(1);
            return SmallVec::new();
        }

        if state.phase == LifecyclePhase::Background {
            tracing::debug!(%ticket, %kind, "Scene in background, dismissing request");
            return Self::resolve(&request, Resolution::Dismissed);
        }

        if let Some(previous) = state.active.take() {
            tracing::debug!(
                previous = %previous.ticket,
                kind = %previous.request.kind,
                "Discarding unresolved request in favour of newer one"
            );
            metrics::counter!("arbiter.requests.superseded").increment(1);
        }

        let cta = match grant {
            GrantState::Denied => CallToAction::OpenSettings,
            GrantState::Undetermined | GrantState::Granted => CallToAction::Primary,
        };
        tracing::debug!(%ticket, %kind, ?cta, "Presenting request");
        state.active = Some(ActiveRequest {
            ticket,
            request,
            cta,
            stale: !state.phase.is_active(),
            accepting: false,
        });
        SmallVec::new()
    }

    fn on_accept(state: &mut ArbiterState, ticket: Ticket, env: &ArbiterEnvironment) -> Effects {
        let Some(active) = state.active_mut(ticket) else {
            return Self::stale_ticket(ticket, "accept");
        };
        if active.accepting {
            tracing::debug!(%ticket, "Accept already in flight");
            return SmallVec::new();
        }
        active.accepting = true;

        let kind = active.request.kind;
        match active.cta {
            CallToAction::Primary => {
                tracing::debug!(%ticket, %kind, "Running action");
                let catalog = Arc::clone(&env.catalog);
                let rating = Arc::clone(&env.rating);
                smallvec![Effect::task(async move {
                    let granted = catalog.perform(kind).await;
                    if kind == RequestKind::AppRating {
                        rating.mark_prompted();
                    }
                    Some(ArbiterAction::ActionCompleted { ticket, granted })
                })]
            },
            CallToAction::OpenSettings => {
                tracing::debug!(%ticket, %kind, "Opening settings");
                let settings = Arc::clone(&env.settings);
                smallvec![Effect::task(async move {
                    settings.open_settings().await;
                    Some(ArbiterAction::SettingsOpened { ticket })
                })]
            },
        }
    }

    fn on_action_completed(
        state: &mut ArbiterState,
        ticket: Ticket,
        granted: bool,
        env: &ArbiterEnvironment,
    ) -> Effects {
        if granted {
            return match state.take_active(ticket) {
                Some(active) => {
                    tracing::debug!(%ticket, "Action granted access");
                    Self::resolve(&active.request, Resolution::Granted)
                },
                None => Self::stale_ticket(ticket, "action_completed"),
            };
        }

        let Some(active) = state.active_mut(ticket) else {
            return Self::stale_ticket(ticket, "action_completed");
        };
        tracing::debug!(%ticket, kind = %active.request.kind, "Action did not grant access, re-probing");
        smallvec![Self::probe(env, ticket, active.request.kind, true)]
    }

    fn on_reprobed(
        state: &mut ArbiterState,
        ticket: Ticket,
        grant: GrantState,
        after_action: bool,
    ) -> Effects {
        let phase = state.phase;
        let Some(active) = state.active_mut(ticket) else {
            return Self::stale_ticket(ticket, "reprobed");
        };

        if phase.is_active() {
            active.stale = false;
        }

        // An action still in flight owns the call-to-action until its own
        // re-probe lands; only a grant found on foreground settles it early.
        if after_action {
            active.accepting = false;
        } else if active.accepting && grant != GrantState::Granted {
            tracing::debug!(%ticket, "Accept in flight, keeping call-to-action");
            return SmallVec::new();
        }

        match grant {
            GrantState::Granted => {
                tracing::debug!(%ticket, "Access granted outside the app, resolving");
                match state.take_active(ticket) {
                    Some(active) => Self::resolve(&active.request, Resolution::Granted),
                    None => SmallVec::new(),
                }
            },
            GrantState::Denied => {
                if active.cta != CallToAction::OpenSettings {
                    tracing::debug!(%ticket, "Access denied, switching to settings call-to-action");
                }
                active.cta = CallToAction::OpenSettings;
                SmallVec::new()
            },
            GrantState::Undetermined => {
                active.cta = CallToAction::Primary;
                SmallVec::new()
            },
        }
    }

    fn on_phase_changed(
        state: &mut ArbiterState,
        phase: LifecyclePhase,
        env: &ArbiterEnvironment,
    ) -> Effects {
        if state.phase == phase {
            return SmallVec::new();
        }
        state.phase = phase;

        match phase {
            LifecyclePhase::Inactive => {
                if let Some(active) = state.active.as_mut() {
                    tracing::debug!(ticket = %active.ticket, "Marking presentation stale");
                    active.stale = true;
                }
                SmallVec::new()
            },
            LifecyclePhase::Background => match state.active.take() {
                Some(active) => {
                    tracing::debug!(ticket = %active.ticket, "Scene left foreground, dismissing request");
                    Self::resolve(&active.request, Resolution::Dismissed)
                },
                None => SmallVec::new(),
            },
            LifecyclePhase::Active => {
                let Some(active) = state.active.as_mut() else {
                    return SmallVec::new();
                };
                if active.accepting || active.request.kind.skips_probe() {
                    active.stale = false;
                    return SmallVec::new();
                }
                tracing::debug!(ticket = %active.ticket, "Back in foreground, re-probing");
                smallvec![Self::probe(env, active.ticket, active.request.kind, false)]
            },
        }
    }
}

impl Reducer for ArbiterReducer {
    type State = ArbiterState;
    type Action = ArbiterAction;
    type Environment = ArbiterEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ArbiterAction::Requested(request) => Self::on_requested(state, request, env),
            ArbiterAction::Probed {
                ticket,
                request,
                state: grant,
            } => Self::on_probed(state, ticket, request, grant),
            ArbiterAction::Accept { ticket } => Self::on_accept(state, ticket, env),
            ArbiterAction::ActionCompleted { ticket, granted } => {
                Self::on_action_completed(state, ticket, granted, env)
            },
            ArbiterAction::SettingsOpened { ticket } => match state.take_active(ticket) {
                Some(active) => {
                    tracing::debug!(%ticket, "Settings opened, resolving as dismissal");
                    Self::resolve(&active.request, Resolution::Dismissed)
                },
                None => Self::stale_ticket(ticket, "settings_opened"),
            },
            ArbiterAction::Reprobed {
                ticket,
                state: grant,
                after_action,
            } => Self::on_reprobed(state, ticket, grant, after_action),
            ArbiterAction::Dismiss { ticket } => match state.take_active(ticket) {
                Some(active) => {
                    tracing::debug!(%ticket, "Request dismissed by user");
                    Self::resolve(&active.request, Resolution::Dismissed)
                },
                None => Self::stale_ticket(ticket, "dismiss"),
            },
            ArbiterAction::PhaseChanged(phase) => Self::on_phase_changed(state, phase, env),
        }
    }
}
