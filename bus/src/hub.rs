//! Composition root.
//!
//! [`Hub`] wires the request bus to the two subscriber stores (arbiter and
//! notification queue), owns the lifecycle and rating gates, and exposes the
//! producer, renderer and lifecycle APIs. Producers that should not see the
//! renderer side take a cloned [`Producer`] instead.

use crate::arbiter::{
    ArbiterAction, ArbiterEnvironment, ArbiterReducer, ArbiterState, Callback, CapabilityRequest,
    Presentation, Ticket,
};
use crate::bus::{BusMessage, RequestBus, Subscription};
use crate::catalog::{Catalog, CatalogError, RequestKind, SettingsOpener};
use crate::config::{BusConfig, ConfigError};
use crate::lifecycle::{LifecycleGate, LifecyclePhase};
use crate::notification::{
    HapticsEngine, NotificationAction, NotificationContent, NotificationEnvironment,
    NotificationId, NotificationItem, NotificationReducer, NotificationSize, NotificationState,
    NotificationStyle, NotificationType, TapCallback,
};
use crate::rating::{RatingGate, RatingProgress};
use futures::StreamExt;
use promptbus_core::{
    environment::{Clock, SystemClock},
    reducer::Reducer,
};
use promptbus_runtime::{EffectHandle, Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::AbortHandle;

/// Store running the arbiter reducer
pub type ArbiterStore = Store<ArbiterState, ArbiterAction, ArbiterEnvironment, ArbiterReducer>;

/// Store running the notification reducer
pub type NotificationStore =
    Store<NotificationState, NotificationAction, NotificationEnvironment, NotificationReducer>;

/// Errors from hub construction and operation
#[derive(Error, Debug)]
pub enum HubError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Incomplete catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A store rejected an action (shutting down)
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Platform collaborators the hub calls into
#[derive(Clone)]
pub struct Collaborators {
    /// Settings deep-link
    pub settings: Arc<dyn SettingsOpener>,
    /// Haptic feedback
    pub haptics: Arc<dyn HapticsEngine>,
    /// Timestamps for notifications
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Collaborators using the system clock
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsOpener>, haptics: Arc<dyn HapticsEngine>) -> Self {
        Self {
            settings,
            haptics,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Producer-facing handle: publishes onto the bus
#[derive(Clone)]
pub struct Producer {
    bus: RequestBus,
    clock: Arc<dyn Clock>,
    rating: Arc<RatingGate>,
}

impl Producer {
    /// Ask for `kind`; at most one of the callbacks ever runs
    ///
    /// An app-rating request only shows its sheet while the rating gate is
    /// open; otherwise it resolves through `on_granted` with no UI.
    pub fn request_capability(
        &self,
        kind: RequestKind,
        on_granted: Option<Callback>,
        on_dismiss: Option<Callback>,
    ) {
        let mut request = CapabilityRequest::new(kind);
        if let Some(callback) = on_granted {
            request = request.on_granted(callback);
        }
        if let Some(callback) = on_dismiss {
            request = request.on_dismiss(callback);
        }
        self.submit(request);
    }

    /// Publish a prepared request
    pub fn submit(&self, request: CapabilityRequest) {
        self.bus.emit(BusMessage::Capability(request));
    }

    /// Show a notification with a custom style
    pub fn emit_notification(
        &self,
        content: NotificationContent,
        style: NotificationStyle,
        on_tap: Option<TapCallback>,
    ) -> NotificationId {
        let item = NotificationItem::new(content, style, self.clock.as_ref());
        self.emit_item(with_tap(item, on_tap))
    }

    /// Show a notification with a predefined style
    pub fn emit_typed_notification(
        &self,
        kind: NotificationType,
        content: NotificationContent,
        size: Option<NotificationSize>,
        on_tap: Option<TapCallback>,
    ) -> NotificationId {
        let mut item = NotificationItem::typed(kind, content, self.clock.as_ref());
        if let Some(size) = size {
            item = item.with_size(size);
        }
        self.emit_item(with_tap(item, on_tap))
    }

    /// Publish a prepared notification
    pub fn emit_item(&self, item: NotificationItem) -> NotificationId {
        let id = item.id;
        self.bus.emit(BusMessage::Notification(item));
        id
    }

    /// Count a positive action; emits an app-rating request when the gate fires
    pub fn record_positive_action(&self) -> bool {
        let fire = self.rating.record_positive_action();
        if fire {
            self.submit(CapabilityRequest::new(RequestKind::AppRating));
        }
        fire
    }
}

fn with_tap(item: NotificationItem, on_tap: Option<TapCallback>) -> NotificationItem {
    match on_tap {
        Some(callback) => item.on_tap(callback),
        None => item,
    }
}

/// Forward every message `to_action` accepts from `subscription` into `store`
fn spawn_pump<S, A, E, R, F>(
    name: &'static str,
    mut subscription: Subscription,
    store: Store<S, A, E, R>,
    to_action: F,
) -> AbortHandle
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(BusMessage) -> Option<A> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = subscription.next().await {
            let Some(action) = to_action(message) else {
                continue;
            };
            if let Err(error) = store.send(action).await {
                tracing::debug!(pump = name, %error, "Store closed, stopping pump");
                break;
            }
        }
    })
    .abort_handle()
}

/// The running request bus with its subscribers
pub struct Hub {
    config: BusConfig,
    bus: RequestBus,
    producer: Producer,
    arbiter: ArbiterStore,
    notifications: NotificationStore,
    lifecycle: LifecycleGate,
    phase_lock: Mutex<()>,
    rating: Arc<RatingGate>,
    pumps: Vec<AbortHandle>,
}

impl Hub {
    /// Validate configuration and catalog, then start the subscribers
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] for invalid configuration and
    /// [`HubError::Catalog`] when a kind has no probe or action.
    pub fn start(
        config: BusConfig,
        catalog: Catalog,
        collaborators: Collaborators,
    ) -> Result<Self, HubError> {
        Self::start_with_rating(config, catalog, collaborators, RatingProgress::default())
    }

    /// Like [`start`](Self::start), resuming rating progress saved from
    /// [`rating_progress`](Self::rating_progress) in an earlier run
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_with_rating(
        config: BusConfig,
        catalog: Catalog,
        collaborators: Collaborators,
        progress: RatingProgress,
    ) -> Result<Self, HubError> {
        config.validate()?;
        catalog.validate()?;

        let bus = RequestBus::new();
        let rating = Arc::new(RatingGate::restore(config.positive_action_threshold, progress));

        let arbiter = Store::with_config(
            ArbiterState::default(),
            ArbiterReducer::new(),
            ArbiterEnvironment::new(
                Arc::new(catalog),
                collaborators.settings,
                Arc::clone(&rating),
            ),
            config.store_config(),
        );

        let notifications = Store::with_config(
            NotificationState::default(),
            NotificationReducer::new(),
            NotificationEnvironment::new(collaborators.haptics)
                .with_max_visible(config.max_visible_notifications)
                .with_display_duration(config.notification_duration()),
            config.store_config(),
        );

        let pumps = vec![
            spawn_pump(
                "capability",
                bus.subscribe(BusMessage::is_capability),
                arbiter.clone(),
                |message| match message {
                    BusMessage::Capability(request) => Some(ArbiterAction::Requested(request)),
                    BusMessage::Notification(_) => None,
                },
            ),
            spawn_pump(
                "notification",
                bus.subscribe(BusMessage::is_notification),
                notifications.clone(),
                |message| match message {
                    BusMessage::Notification(item) => Some(NotificationAction::Received(item)),
                    BusMessage::Capability(_) => None,
                },
            ),
        ];

        let producer = Producer {
            bus: bus.clone(),
            clock: collaborators.clock,
            rating: Arc::clone(&rating),
        };

        tracing::info!(
            max_visible = config.max_visible_notifications,
            duration_ms = config.notification_duration_ms,
            threshold = config.positive_action_threshold,
            positive_actions = progress.positive_actions,
            prompted = progress.prompted,
            "Request bus started"
        );

        Ok(Self {
            config,
            bus,
            producer,
            arbiter,
            notifications,
            lifecycle: LifecycleGate::default(),
            phase_lock: Mutex::new(()),
            rating,
            pumps,
        })
    }

    /// Cloneable producer handle
    #[must_use]
    pub fn producer(&self) -> Producer {
        self.producer.clone()
    }

    /// The underlying bus (for additional observers)
    #[must_use]
    pub const fn bus(&self) -> &RequestBus {
        &self.bus
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    // ========== Producer API ==========

    /// See [`Producer::request_capability`]
    pub fn request_capability(
        &self,
        kind: RequestKind,
        on_granted: Option<Callback>,
        on_dismiss: Option<Callback>,
    ) {
        self.producer.request_capability(kind, on_granted, on_dismiss);
    }

    /// See [`Producer::emit_notification`]
    pub fn emit_notification(
        &self,
        content: NotificationContent,
        style: NotificationStyle,
        on_tap: Option<TapCallback>,
    ) -> NotificationId {
        self.producer.emit_notification(content, style, on_tap)
    }

    /// See [`Producer::emit_typed_notification`]
    pub fn emit_typed_notification(
        &self,
        kind: NotificationType,
        content: NotificationContent,
        size: Option<NotificationSize>,
        on_tap: Option<TapCallback>,
    ) -> NotificationId {
        self.producer
            .emit_typed_notification(kind, content, size, on_tap)
    }

    /// See [`Producer::record_positive_action`]
    pub fn record_positive_action(&self) -> bool {
        self.producer.record_positive_action()
    }

    // ========== Renderer API ==========

    /// The request currently presented, if any
    pub async fn presentation(&self) -> Option<Presentation> {
        self.arbiter.state(ArbiterState::presentation).await
    }

    /// Visible notifications, newest first
    pub async fn notifications(&self) -> Vec<NotificationItem> {
        self.notifications
            .state(|state| state.items.iter().cloned().collect())
            .await
    }

    /// The user pressed the call-to-action of `ticket`
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] after shutdown.
    pub async fn accept(&self, ticket: Ticket) -> Result<EffectHandle, HubError> {
        Ok(self.arbiter.send(ArbiterAction::Accept { ticket }).await?)
    }

    /// The user declined `ticket`
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] after shutdown.
    pub async fn dismiss(&self, ticket: Ticket) -> Result<EffectHandle, HubError> {
        Ok(self.arbiter.send(ArbiterAction::Dismiss { ticket }).await?)
    }

    /// The user tapped notification `id`
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] after shutdown.
    pub async fn tap(&self, id: NotificationId) -> Result<EffectHandle, HubError> {
        Ok(self.notifications.send(NotificationAction::Tapped { id }).await?)
    }

    /// The user swiped notification `id` away
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] after shutdown.
    pub async fn swipe(&self, id: NotificationId) -> Result<EffectHandle, HubError> {
        Ok(self.notifications.send(NotificationAction::Swiped { id }).await?)
    }

    /// Observe arbiter actions produced by probes, actions and callbacks
    #[must_use]
    pub fn subscribe_arbiter_actions(&self) -> broadcast::Receiver<ArbiterAction> {
        self.arbiter.subscribe_actions()
    }

    /// Observe notification actions produced by timers
    #[must_use]
    pub fn subscribe_notification_actions(&self) -> broadcast::Receiver<NotificationAction> {
        self.notifications.subscribe_actions()
    }

    // ========== Lifecycle API ==========

    /// Current scene phase
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    /// Phase source, for hosts that want to watch transitions
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleGate {
        &self.lifecycle
    }

    /// Report a scene phase; `false` if it repeats the current phase
    ///
    /// Concurrent calls are applied one at a time, so both stores see phases
    /// in the order the gate accepted them.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] after shutdown.
    pub async fn set_phase(&self, phase: LifecyclePhase) -> Result<bool, HubError> {
        let _guard = self.phase_lock.lock().await;
        if self.lifecycle.transition(phase).is_none() {
            return Ok(false);
        }

        self.arbiter.send(ArbiterAction::PhaseChanged(phase)).await?;
        self.notifications
            .send(NotificationAction::PhaseChanged(phase))
            .await?;
        Ok(true)
    }

    // ========== Rating ==========

    /// Progress of the rating gate, for persistence
    #[must_use]
    pub fn rating_progress(&self) -> RatingProgress {
        self.rating.progress()
    }

    /// Clear the rating counter and prompted flag
    pub fn reset_rating(&self) {
        self.rating.reset();
    }

    // ========== Shutdown ==========

    /// Stop the pumps and shut both stores down
    ///
    /// Pending notification timers are aborted.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if in-flight effects outlive the timeout.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        for pump in &self.pumps {
            pump.abort();
        }

        let timeout = self.config.shutdown_timeout();
        let (arbiter, notifications) = tokio::join!(
            self.arbiter.shutdown(timeout),
            self.notifications.shutdown(timeout)
        );
        arbiter?;
        notifications?;
        tracing::info!("Request bus stopped");
        Ok(())
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
