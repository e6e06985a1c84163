//! In-app notification queue.
//!
//! A bounded, newest-first list of transient notifications. Each item gets
//! an auto-dismiss timer when inserted; every removal path (swipe, tap,
//! expiry, eviction) goes through remove-by-id, which is idempotent, so a
//! timer racing a manual removal is harmless.

use crate::lifecycle::LifecyclePhase;
use chrono::{DateTime, Utc};
use promptbus_core::{
    SmallVec,
    effect::{Effect, EffectId},
    environment::Clock,
    reducer::Reducer,
    smallvec,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Timer registered for this notification
    #[must_use]
    pub fn timer_id(self) -> EffectId {
        EffectId::new(format!("notification-timer-{}", self.0))
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text of a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationContent {
    /// Bold first line
    pub title: String,
    /// Body text
    pub message: String,
}

impl NotificationContent {
    /// Create content from a title and message
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Tint of the notification symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolColor {
    /// System red
    Red,
    /// System yellow
    Yellow,
    /// System blue
    Blue,
    /// System green
    Green,
    /// System indigo
    Indigo,
    /// System orange
    Orange,
    /// Arbitrary sRGB color
    Rgb {
        /// Red channel
        r: u8,
        /// Green channel
        g: u8,
        /// Blue channel
        b: u8,
    },
}

/// Layout of a notification banner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSize {
    /// Title, message and symbol
    #[default]
    Normal,
    /// Single-line pill for quick info
    Compact,
}

/// Haptic pattern played when a notification appears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticFeedback {
    /// Task completed
    Success,
    /// Something needs attention
    Warning,
    /// Task failed
    Error,
}

/// Plays haptic feedback on the device
pub trait HapticsEngine: Send + Sync {
    /// Play `feedback` now
    fn play(&self, feedback: HapticFeedback);
}

/// Visual and haptic presentation of a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationStyle {
    /// SF Symbol name
    pub symbol: String,
    /// Symbol tint
    pub color: SymbolColor,
    /// Banner layout
    pub size: NotificationSize,
    /// Haptic played on appearance
    pub haptic: HapticFeedback,
}

impl NotificationStyle {
    /// Custom style with normal size and warning haptic
    #[must_use]
    pub fn new(symbol: impl Into<String>, color: SymbolColor) -> Self {
        Self {
            symbol: symbol.into(),
            color,
            size: NotificationSize::Normal,
            haptic: HapticFeedback::Warning,
        }
    }

    /// Override the size
    #[must_use]
    pub fn with_size(mut self, size: NotificationSize) -> Self {
        self.size = size;
        self
    }

    /// Override the haptic
    #[must_use]
    pub fn with_haptic(mut self, haptic: HapticFeedback) -> Self {
        self.haptic = haptic;
        self
    }
}

/// Predefined semantic notification styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Something went wrong
    Error,
    /// Something may go wrong
    Warning,
    /// Neutral information
    Info,
    /// An operation succeeded
    Success,
    /// An operation did not succeed
    Failure,
}

impl NotificationType {
    /// The style this type maps to
    #[must_use]
    pub fn style(self) -> NotificationStyle {
        let (symbol, color, haptic) = match self {
            Self::Error => ("exclamationmark.triangle", SymbolColor::Red, HapticFeedback::Error),
            Self::Warning => (
                "exclamationmark.triangle",
                SymbolColor::Yellow,
                HapticFeedback::Warning,
            ),
            Self::Info => ("info.circle", SymbolColor::Blue, HapticFeedback::Warning),
            Self::Success => ("checkmark.circle", SymbolColor::Green, HapticFeedback::Success),
            Self::Failure => ("xmark.circle", SymbolColor::Red, HapticFeedback::Error),
        };

        NotificationStyle {
            symbol: symbol.to_string(),
            color,
            size: NotificationSize::Compact,
            haptic,
        }
    }
}

/// What tapping a notification does besides running its tap callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapPolicy {
    /// Leave the notification visible
    #[default]
    Keep,
    /// Remove the notification
    Dismiss,
}

/// Callback run on every tap
pub type TapCallback = Arc<dyn Fn() + Send + Sync>;

/// A notification owned by the queue until it is removed
#[derive(Clone)]
pub struct NotificationItem {
    /// Identity used for removal
    pub id: NotificationId,
    /// Text
    pub content: NotificationContent,
    /// Presentation
    pub style: NotificationStyle,
    /// Tap behaviour
    pub tap_policy: TapPolicy,
    /// Emission time
    pub created_at: DateTime<Utc>,
    on_tap: Option<TapCallback>,
}

impl NotificationItem {
    /// Create an item with a custom style
    #[must_use]
    pub fn new(content: NotificationContent, style: NotificationStyle, clock: &dyn Clock) -> Self {
        Self {
            id: NotificationId::new(),
            content,
            style,
            tap_policy: TapPolicy::default(),
            created_at: clock.now(),
            on_tap: None,
        }
    }

    /// Create an item with a predefined style
    #[must_use]
    pub fn typed(kind: NotificationType, content: NotificationContent, clock: &dyn Clock) -> Self {
        Self::new(content, kind.style(), clock)
    }

    /// Override the size, keeping symbol, color and haptic
    #[must_use]
    pub fn with_size(mut self, size: NotificationSize) -> Self {
        self.style.size = size;
        self
    }

    /// Run `callback` whenever the notification is tapped
    #[must_use]
    pub fn on_tap(mut self, callback: TapCallback) -> Self {
        self.on_tap = Some(callback);
        self
    }

    /// Set what a tap does to the notification
    #[must_use]
    pub const fn with_tap_policy(mut self, policy: TapPolicy) -> Self {
        self.tap_policy = policy;
        self
    }

    /// Whether the item has a tap callback
    #[must_use]
    pub const fn is_tappable(&self) -> bool {
        self.on_tap.is_some()
    }

    /// Same content and same style
    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self) -> bool {
        self.content == other.content && self.style == other.style
    }
}

impl fmt::Debug for NotificationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationItem")
            .field("id", &self.id)
            .field("content", &self.content)
            .field("style", &self.style)
            .field("tap_policy", &self.tap_policy)
            .field("created_at", &self.created_at)
            .field("tappable", &self.is_tappable())
            .finish()
    }
}

/// Visible notifications, newest first
#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    /// Queue contents; index 0 is the newest
    pub items: VecDeque<NotificationItem>,
    /// Last phase reported by the lifecycle gate
    pub phase: LifecyclePhase,
}

impl NotificationState {
    /// Number of visible notifications
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no notification is visible
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `id` is visible
    #[must_use]
    pub fn contains(&self, id: NotificationId) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    /// Remove `id`; `None` if it was not visible
    fn remove(&mut self, id: NotificationId) -> Option<NotificationItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        self.items.remove(index)
    }
}

/// Actions for the notification queue
#[derive(Debug, Clone)]
pub enum NotificationAction {
    /// A producer emitted a notification
    Received(NotificationItem),
    /// The user swiped the notification away
    Swiped {
        /// Notification swiped
        id: NotificationId,
    },
    /// The user tapped the notification
    Tapped {
        /// Notification tapped
        id: NotificationId,
    },
    /// The auto-dismiss timer fired
    Expired {
        /// Notification whose timer fired
        id: NotificationId,
    },
    /// The scene lifecycle changed
    PhaseChanged(LifecyclePhase),
}

/// Dependencies of the notification queue
#[derive(Clone)]
pub struct NotificationEnvironment {
    /// Haptics collaborator
    pub haptics: Arc<dyn HapticsEngine>,
    /// Capacity of the queue
    pub max_visible: usize,
    /// How long a notification stays before it expires
    pub display_duration: Duration,
}

impl NotificationEnvironment {
    /// Create an environment with the default capacity (3) and duration (6s)
    #[must_use]
    pub fn new(haptics: Arc<dyn HapticsEngine>) -> Self {
        Self {
            haptics,
            max_visible: 3,
            display_duration: Duration::from_secs(6),
        }
    }

    /// Set the capacity
    #[must_use]
    pub const fn with_max_visible(mut self, max_visible: usize) -> Self {
        self.max_visible = max_visible;
        self
    }

    /// Set how long notifications stay visible
    #[must_use]
    pub const fn with_display_duration(mut self, duration: Duration) -> Self {
        self.display_duration = duration;
        self
    }
}

/// Reducer for the notification queue
#[derive(Clone, Debug, Default)]
pub struct NotificationReducer;

impl NotificationReducer {
    /// Creates a new `NotificationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn insert(
        state: &mut NotificationState,
        item: NotificationItem,
        env: &NotificationEnvironment,
    ) -> SmallVec<[Effect<NotificationAction>; 4]> {
        let mut effects = SmallVec::new();
        metrics::counter!("notifications.emitted").increment(1);

        if state.phase.is_active() {
            let haptics = Arc::clone(&env.haptics);
            let feedback = item.style.haptic;
            effects.push(Effect::fire_and_forget(async move {
                haptics.play(feedback);
            }));
        }

        if state.items.front().is_some_and(|head| head.is_duplicate_of(&item)) {
            tracing::debug!(id = %item.id, title = %item.content.title, "Suppressing duplicate notification");
            metrics::counter!("notifications.deduplicated").increment(1);
            return effects;
        }

        while state.items.len() >= env.max_visible.max(1) {
            let Some(oldest) = state.items.pop_back() else {
                break;
            };
            tracing::debug!(id = %oldest.id, "Evicting oldest notification");
            metrics::counter!("notifications.evicted").increment(1);
            effects.push(Effect::Cancel(oldest.id.timer_id()));
        }

        let id = item.id;
        tracing::debug!(%id, title = %item.content.title, "Showing notification");
        state.items.push_front(item);

        effects.push(
            Effect::Delay {
                duration: env.display_duration,
                action: Box::new(NotificationAction::Expired { id }),
            }
            .cancellable(id.timer_id()),
        );
        effects
    }

    fn dismiss(
        state: &mut NotificationState,
        id: NotificationId,
    ) -> SmallVec<[Effect<NotificationAction>; 4]> {
        if state.remove(id).is_some() {
            tracing::debug!(%id, "Notification dismissed");
            smallvec![Effect::Cancel(id.timer_id())]
        } else {
            tracing::trace!(%id, "Notification already gone");
            SmallVec::new()
        }
    }
}

impl Reducer for NotificationReducer {
    type State = NotificationState;
    type Action = NotificationAction;
    type Environment = NotificationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            NotificationAction::Received(item) => Self::insert(state, item, env),
            NotificationAction::Swiped { id } => Self::dismiss(state, id),
            NotificationAction::Tapped { id } => {
                let Some(item) = state.items.iter().find(|item| item.id == id) else {
                    tracing::trace!(%id, "Tap on notification that is no longer visible");
                    return SmallVec::new();
                };

                let mut effects = SmallVec::new();
                if let Some(callback) = item.on_tap.clone() {
                    effects.push(Effect::fire_and_forget(async move { callback() }));
                }
                if item.tap_policy == TapPolicy::Dismiss {
                    effects.extend(Self::dismiss(state, id));
                }
                effects
            },
            NotificationAction::Expired { id } => {
                if state.remove(id).is_some() {
                    tracing::debug!(%id, "Notification expired");
                    metrics::counter!("notifications.expired").increment(1);
                }
                SmallVec::new()
            },
            NotificationAction::PhaseChanged(phase) => {
                state.phase = phase;
                SmallVec::new()
            },
        }
    }
}
