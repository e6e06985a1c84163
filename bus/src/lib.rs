//! # promptbus
//!
//! An in-process request bus for user-facing prompts.
//!
//! Producers publish two kinds of messages onto a [`RequestBus`]:
//!
//! - **Capability requests** ("may I use the camera?"). The arbiter probes the
//!   current grant state, auto-grants what is already allowed, presents at most
//!   one request at a time, and resolves every request exactly once through its
//!   `on_granted` / `on_dismiss` callbacks.
//! - **Notifications**. The queue keeps a bounded, de-duplicated list of
//!   transient banners, newest first, each removed after a display timer,
//!   a swipe or a tap.
//!
//! Both subscribers are reducers running in a [`promptbus_runtime::Store`], so
//! their decisions are pure and tested without a runtime; probes, actions,
//! haptics and timers are effects.
//!
//! ## Quick Start
//!
//! ```no_run
//! use promptbus::catalog::{Catalog, GrantAction, GrantProbe, GrantState, RequestKind};
//! use promptbus::config::BusConfig;
//! use promptbus::hub::{Collaborators, Hub};
//! use promptbus::mock::{RecordingHaptics, RecordingSettings, ScriptedAction, ScriptedProbe};
//! use promptbus::notification::{NotificationContent, NotificationType};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), promptbus::hub::HubError> {
//! let probe: Arc<dyn GrantProbe> = Arc::new(ScriptedProbe::always(GrantState::Undetermined));
//! let action: Arc<dyn GrantAction> = Arc::new(ScriptedAction::succeeding());
//!
//! let hub = Hub::start(
//!     BusConfig::default(),
//!     Catalog::new().with_all(&probe, &action),
//!     Collaborators::new(Arc::new(RecordingSettings::new()), Arc::new(RecordingHaptics::new())),
//! )?;
//!
//! hub.request_capability(RequestKind::CameraAccess, None, None);
//! hub.emit_typed_notification(
//!     NotificationType::Success,
//!     NotificationContent::new("Saved", "Your changes were saved"),
//!     None,
//!     None,
//! );
//!
//! if let Some(presented) = hub.presentation().await {
//!     hub.accept(presented.ticket).await?;
//! }
//! hub.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod arbiter;
pub mod bus;
pub mod catalog;
pub mod config;
pub mod hub;
pub mod lifecycle;
pub mod mock;
pub mod notification;
pub mod rating;

pub use arbiter::{CapabilityRequest, Presentation, Ticket};
pub use bus::{BusMessage, RequestBus};
pub use catalog::{Catalog, GrantState, RequestKind};
pub use config::BusConfig;
pub use hub::{Collaborators, Hub, HubError, Producer};
pub use lifecycle::LifecyclePhase;
pub use notification::{NotificationContent, NotificationId, NotificationItem, NotificationType};
