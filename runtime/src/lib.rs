//! # Promptbus Runtime
//!
//! Runtime implementation for the promptbus reducer architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Tracks in-flight cancellable effects (timers) by id
//!
//! ## Single cooperative sequence
//!
//! The reducer runs while holding the state write lock, so every state
//! mutation of one Store happens on one logical sequence. Effects run on
//! spawned tasks and hop back onto that sequence by sending their resulting
//! action through [`Store::send`].
//!
//! ## Example
//!
//! ```ignore
//! use promptbus_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use promptbus_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::AbortHandle;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for effects to complete
        #[error("Timeout waiting for effects")]
        Timeout,
    }
}

pub use error::StoreError;

/// Configuration for Store instances
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(256)
///     .with_shutdown_timeout(Duration::from_secs(5));
///
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of actions buffered for slow action observers
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Effect tracking mode - controls how effects are tracked for completion
///
/// # Modes
///
/// - **Direct**: Tracks only immediate effects (default)
/// - **Cascading**: Tracks effects transitively, following the entire effect tree
#[derive(Debug, Clone)]
pub enum TrackingMode {
    /// Track only immediate effects spawned by this action
    Direct,

    /// Track effects transitively - any effects produced by feedback actions
    /// are also tracked as children
    Cascading {
        /// Child effect handles that need to complete before this handle is done
        children: Arc<Mutex<Vec<EffectHandle>>>,
    },
}

impl TrackingMode {
    /// Fresh cascading mode with no children yet
    #[must_use]
    pub fn cascading() -> Self {
        Self::Cascading {
            children: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for effects to complete.
/// Each action gets a handle that can be awaited to know when its effects
/// (and optionally cascading effects) are done.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    mode: TrackingMode,
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle with the given tracking mode
    ///
    /// Returns the handle given to the caller and the tracking context
    /// carried through effect execution.
    fn new(mode: TrackingMode) -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            mode: mode.clone(),
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            mode,
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            mode: TrackingMode::Direct,
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait for all effects to complete
    ///
    /// Waits until the effect counter reaches zero, then (in cascading mode)
    /// recursively waits for every child handle.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }

        if let TrackingMode::Cascading { children } = &self.mode {
            loop {
                let handles = {
                    let mut guard = lock(children);
                    if guard.is_empty() {
                        break;
                    }
                    guard.drain(..).collect::<Vec<_>>()
                };

                for mut handle in handles {
                    Box::pin(handle.wait()).await;
                }
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("mode", &self.mode)
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    mode: TrackingMode,
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect
/// panics or is aborted through cancellation.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Internal: in-flight cancellable effects keyed by [`EffectId`]
///
/// Each registration carries a generation so a finished task never removes
/// a newer registration that replaced it under the same id.
#[derive(Default)]
struct Cancellations {
    next_generation: AtomicU64,
    inflight: Mutex<HashMap<EffectId, (u64, AbortHandle)>>,
}

impl Cancellations {
    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn cancel(&self, id: &EffectId) -> bool {
        let removed = lock(&self.inflight).remove(id);
        removed.is_some_and(|(_, handle)| {
            handle.abort();
            true
        })
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.inflight).drain().collect();
        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        drained.len()
    }

    fn release(&self, id: &EffectId, generation: u64) {
        let mut inflight = lock(&self.inflight);
        if inflight.get(id).is_some_and(|(current, _)| *current == generation) {
            inflight.remove(id);
        }
    }

    fn len(&self) -> usize {
        lock(&self.inflight).len()
    }
}

const fn effect_type<A>(effect: &Effect<A>) -> &'static str {
    match effect {
        Effect::None => "none",
        Effect::Parallel(_) => "parallel",
        Effect::Sequential(_) => "sequential",
        Effect::Delay { .. } => "delay",
        Effect::Future(_) => "future",
        Effect::Cancellable { .. } => "cancellable",
        Effect::Cancel(_) => "cancel",
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, Cancellations, DecrementGuard,
        Duration, Effect, EffectHandle, EffectId, EffectTracking, Ordering, Reducer, RwLock,
        StoreConfig, StoreError, TrackingMode, effect_type, lock,
    };
    use futures::future::{BoxFuture, join_all};
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: Arc<Cancellations>,
        default_shutdown_timeout: Duration,
        /// Action broadcast channel for observing actions produced by effects.
        ///
        /// Renderers subscribe here to learn when arbitration or queue state
        /// changed as a result of an async probe, action or timer.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`].
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: Arc::new(Cancellations::default()),
                default_shutdown_timeout: config.default_shutdown_timeout,
                action_broadcast,
            }
        }

        /// Number of cancellable effects currently in flight
        #[must_use]
        pub fn cancellable_in_flight(&self) -> usize {
            self.cancellations.len()
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Aborts every in-flight cancellable effect (pending timers)
        /// 3. Waits for the remaining effects to complete (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let aborted = self.cancellations.cancel_all();
            if aborted > 0 {
                tracing::debug!(aborted, "Aborted cancellable effects during shutdown");
                metrics::counter!("store.effects.cancelled").increment(aborted as u64);
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Shut down using the configured default timeout
        ///
        /// # Errors
        ///
        /// See [`Store::shutdown`].
        pub async fn close(&self) -> Result<(), StoreError> {
            self.shutdown(self.default_shutdown_timeout).await
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        ///
        /// `send()` returns after starting effect execution, not completion.
        /// Concurrent `send()` calls serialize at the reducer level.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            self.send_internal(action, TrackingMode::Direct).await
        }

        /// Send an action and track every effect it transitively causes
        ///
        /// Waiting on the returned handle waits for the effects of the action,
        /// the actions those effects feed back, their effects, and so on.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        pub async fn send_cascading(&self, action: A) -> Result<EffectHandle, StoreError> {
            self.send_internal(action, TrackingMode::cascading()).await
        }

        /// Subscribe to all actions produced by effects
        ///
        /// Only actions fed back by effects are broadcast (not actions sent via
        /// `send`). A lagging receiver skips old actions.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let visible = store.state(|s| s.items.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        async fn send_internal(
            &self,
            action: A,
            tracking_mode: TrackingMode,
        ) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new(tracking_mode);

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Broadcast an effect-produced action and feed it back into the store
        async fn feed_back(&self, action: A, tracking: &EffectTracking) {
            let _ = self.action_broadcast.send(action.clone());

            let result = match &tracking.mode {
                TrackingMode::Direct => self.send(action).await.map(|_| ()),
                TrackingMode::Cascading { children } => self
                    .send_internal(action, TrackingMode::cascading())
                    .await
                    .map(|handle| lock(children).push(handle)),
            };

            if let Err(error) = result {
                tracing::debug!(%error, "Feedback action dropped");
            }
        }

        /// Execute an effect with tracking
        ///
        /// `None` and `Cancel` are handled synchronously. `Cancellable` is
        /// registered before this returns, so a `Cancel` produced by the very
        /// next action always finds it. Everything else runs on a spawned task.
        ///
        /// **Effect execution failures**: a panicking effect only takes down its
        /// own task. [`DecrementGuard`] keeps the counters accurate.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned, so pass by value is intentional
        fn execute_effect_internal(&self, effect: Effect<A>, tracking: EffectTracking) {
            let kind = effect_type(&effect);
            metrics::counter!("store.effects.executed", "type" => kind).increment(1);

            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Cancel(id) => self.cancel(&id),
                Effect::Cancellable { id, effect } => {
                    drop(self.spawn_cancellable(id, *effect, tracking));
                },
                Effect::Parallel(effects) => {
                    tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                    for effect in effects {
                        self.execute_effect_internal(effect, tracking.clone());
                    }
                },
                effect => {
                    tracking.increment();
                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking.clone());
                        let _pending_guard = pending_guard;
                        store.run_effect(effect, tracking).await;
                    });
                },
            }
        }

        fn cancel(&self, id: &EffectId) {
            if self.cancellations.cancel(id) {
                tracing::debug!(effect_id = %id, "Cancelled in-flight effect");
                metrics::counter!("store.effects.cancelled").increment(1);
            } else {
                tracing::trace!(effect_id = %id, "Cancel requested for effect not in flight");
            }
        }

        /// Spawn `effect` on its own task and register it under `id`
        ///
        /// A previous registration under the same id is aborted.
        fn spawn_cancellable(
            &self,
            id: EffectId,
            effect: Effect<A>,
            tracking: EffectTracking,
        ) -> JoinHandle<()> {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            let generation = self.cancellations.next_generation();
            let store = self.clone();
            let task_id = id.clone();

            // Hold the registry lock until the handle is recorded so the task
            // cannot release its slot before it exists.
            let mut inflight = lock(&self.cancellations.inflight);
            let handle = tokio::spawn(async move {
                let _guard = DecrementGuard(tracking.clone());
                let _pending_guard = pending_guard;
                store.run_effect(effect, tracking).await;
                store.cancellations.release(&task_id, generation);
            });

            if let Some((_, previous)) = inflight.insert(id.clone(), (generation, handle.abort_handle())) {
                previous.abort();
                tracing::debug!(effect_id = %id, "Replaced in-flight cancellable effect");
            }
            drop(inflight);

            handle
        }

        /// Run an effect to completion on the current task
        fn run_effect(&self, effect: Effect<A>, tracking: EffectTracking) -> BoxFuture<'static, ()> {
            let store = self.clone();

            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Cancel(id) => store.cancel(&id),
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.feed_back(action, &tracking).await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                        tokio::time::sleep(duration).await;
                        store.feed_back(*action, &tracking).await;
                    },
                    Effect::Parallel(effects) => {
                        join_all(
                            effects
                                .into_iter()
                                .map(|effect| store.run_effect(effect, tracking.clone())),
                        )
                        .await;
                    },
                    Effect::Sequential(effects) => {
                        let effect_count = effects.len();
                        for (idx, effect) in effects.into_iter().enumerate() {
                            tracing::trace!(
                                "Executing sequential effect {} of {}",
                                idx + 1,
                                effect_count
                            );
                            store.run_effect(effect, tracking.clone()).await;
                        }
                    },
                    Effect::Cancellable { id, effect } => {
                        let handle = store.spawn_cancellable(id, *effect, tracking.clone());
                        if let Err(error) = handle.await {
                            tracing::trace!(%error, "Nested cancellable effect did not complete");
                        }
                    },
                }
            })
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: Arc::clone(&self.cancellations),
                default_shutdown_timeout: self.default_shutdown_timeout,
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
