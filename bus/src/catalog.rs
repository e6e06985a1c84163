//! Static registry of capability request kinds.
//!
//! Every [`RequestKind`] carries fixed presentation metadata and is bound, at
//! hub construction, to one [`GrantProbe`] (read the current grant state) and
//! one [`GrantAction`] (trigger the OS consent flow or review prompt). Probes
//! and actions are trait objects so hosts can plug in their platform APIs and
//! tests can script them.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// What a producer is asking the user for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Location while the app is in use
    LocationAccess,
    /// Camera capture
    CameraAccess,
    /// Photo library read access
    PhotoLibraryAccess,
    /// Address book
    ContactsAccess,
    /// Calendar events
    CalendarAccess,
    /// Reminders
    RemindersAccess,
    /// Microphone recording
    MicrophoneAccess,
    /// App Store review prompt
    AppRating,
}

impl RequestKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 8] = [
        Self::LocationAccess,
        Self::CameraAccess,
        Self::PhotoLibraryAccess,
        Self::ContactsAccess,
        Self::CalendarAccess,
        Self::RemindersAccess,
        Self::MicrophoneAccess,
        Self::AppRating,
    ];

    /// Kinds that are never probed and always start out undetermined
    #[must_use]
    pub const fn skips_probe(self) -> bool {
        matches!(self, Self::AppRating)
    }

    /// Static presentation metadata for this kind
    #[must_use]
    pub const fn metadata(self) -> &'static RequestMetadata {
        match self {
            Self::LocationAccess => &LOCATION,
            Self::CameraAccess => &CAMERA,
            Self::PhotoLibraryAccess => &PHOTO_LIBRARY,
            Self::ContactsAccess => &CONTACTS,
            Self::CalendarAccess => &CALENDAR,
            Self::RemindersAccess => &REMINDERS,
            Self::MicrophoneAccess => &MICROPHONE,
            Self::AppRating => &APP_RATING,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LocationAccess => "location_access",
            Self::CameraAccess => "camera_access",
            Self::PhotoLibraryAccess => "photo_library_access",
            Self::ContactsAccess => "contacts_access",
            Self::CalendarAccess => "calendar_access",
            Self::RemindersAccess => "reminders_access",
            Self::MicrophoneAccess => "microphone_access",
            Self::AppRating => "app_rating",
        };
        f.write_str(name)
    }
}

/// Copy and symbol shown when a request is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    /// SF Symbol name
    pub symbol: &'static str,
    /// Headline
    pub title: &'static str,
    /// Explanation of why the app asks
    pub subtitle: &'static str,
    /// Primary call-to-action text
    pub cta: &'static str,
    /// Secondary (decline) button text
    pub dismiss: &'static str,
    /// Optional fine print under the buttons
    pub footer: Option<&'static str>,
}

/// Call-to-action text shown once access has been denied at the OS level
pub const SETTINGS_CTA: &str = "Allow in Settings";

const DISMISS: &str = "Dismiss";

const LOCATION: RequestMetadata = RequestMetadata {
    symbol: "location.circle",
    title: "Share Your Location",
    subtitle: "Your location lets us show nearby pickups and track your trip in real time.",
    cta: "Allow Location Access",
    dismiss: DISMISS,
    footer: Some("You can change this at any time in Settings."),
};

const CAMERA: RequestMetadata = RequestMetadata {
    symbol: "camera",
    title: "Camera Access",
    subtitle: "Scan tickets and booking codes straight from your camera.",
    cta: "Allow Camera Access",
    dismiss: DISMISS,
    footer: None,
};

const PHOTO_LIBRARY: RequestMetadata = RequestMetadata {
    symbol: "photo.on.rectangle",
    title: "Photo Library",
    subtitle: "Attach receipts and trip photos from your library.",
    cta: "Allow Photo Access",
    dismiss: DISMISS,
    footer: None,
};

const CONTACTS: RequestMetadata = RequestMetadata {
    symbol: "person.crop.circle",
    title: "Contacts",
    subtitle: "Share your trip with friends and family without typing their details.",
    cta: "Allow Contacts Access",
    dismiss: DISMISS,
    footer: None,
};

const CALENDAR: RequestMetadata = RequestMetadata {
    symbol: "calendar",
    title: "Calendar",
    subtitle: "Add upcoming trips to your calendar automatically.",
    cta: "Allow Calendar Access",
    dismiss: DISMISS,
    footer: None,
};

const REMINDERS: RequestMetadata = RequestMetadata {
    symbol: "checklist",
    title: "Reminders",
    subtitle: "Get a reminder before your ride departs.",
    cta: "Allow Reminders",
    dismiss: DISMISS,
    footer: None,
};

const MICROPHONE: RequestMetadata = RequestMetadata {
    symbol: "mic",
    title: "Microphone",
    subtitle: "Talk to your driver through in-app voice messages.",
    cta: "Allow Microphone Access",
    dismiss: DISMISS,
    footer: None,
};

const APP_RATING: RequestMetadata = RequestMetadata {
    symbol: "star.bubble",
    title: "Enjoying the App?",
    subtitle: "A quick rating helps other travellers find us.",
    cta: "Rate the App",
    dismiss: "Later",
    footer: Some("It only takes a moment."),
};

/// Current OS-level grant state of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    /// Access is available
    Granted,
    /// The user refused; only the Settings app can change this
    Denied,
    /// The user has not decided yet
    Undetermined,
}

/// A probe could not determine the grant state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Probe for {kind} failed: {reason}")]
pub struct ProbeError {
    /// Kind being probed
    pub kind: RequestKind,
    /// Platform-specific description
    pub reason: String,
}

/// An action could not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Action for {kind} failed: {reason}")]
pub struct ActionError {
    /// Kind whose action failed
    pub kind: RequestKind,
    /// Platform-specific description
    pub reason: String,
}

/// Errors from catalog lookups and validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A kind has no registered probe or action
    #[error("No {missing} registered for {kind}")]
    MissingEntry {
        /// Kind lacking an entry
        kind: RequestKind,
        /// Which half is missing ("probe" or "action")
        missing: &'static str,
    },
}

/// Reads the grant state of a capability without user-visible side effects
///
/// Uses an explicit boxed future so implementations can be stored as
/// `Arc<dyn GrantProbe>`.
pub trait GrantProbe: Send + Sync {
    /// Determine the current grant state of `kind`
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the platform cannot answer.
    fn probe(&self, kind: RequestKind) -> BoxFuture<'_, Result<GrantState, ProbeError>>;
}

/// Performs the OS-level consent flow (or review prompt) for a capability
pub trait GrantAction: Send + Sync {
    /// Run the consent flow; `true` means access was obtained
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] when the flow could not run at all.
    fn perform(&self, kind: RequestKind) -> BoxFuture<'_, Result<bool, ActionError>>;
}

/// Opens the app's page in the system Settings app
pub trait SettingsOpener: Send + Sync {
    /// Deep-link into Settings
    fn open_settings(&self) -> BoxFuture<'_, ()>;
}

/// Probe and action registered for one kind
#[derive(Clone, Default)]
struct CatalogEntry {
    probe: Option<Arc<dyn GrantProbe>>,
    action: Option<Arc<dyn GrantAction>>,
}

/// Registry binding every [`RequestKind`] to its probe and action
///
/// # Example
///
/// ```ignore
/// let catalog = Catalog::new()
///     .with_probe(RequestKind::LocationAccess, location.clone())
///     .with_action(RequestKind::LocationAccess, location);
/// catalog.validate()?;
/// ```
#[derive(Clone, Default)]
pub struct Catalog {
    entries: HashMap<RequestKind, CatalogEntry>,
}

impl Catalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the probe for `kind`, replacing any previous one
    #[must_use]
    pub fn with_probe(mut self, kind: RequestKind, probe: Arc<dyn GrantProbe>) -> Self {
        self.entries.entry(kind).or_default().probe = Some(probe);
        self
    }

    /// Register the action for `kind`, replacing any previous one
    #[must_use]
    pub fn with_action(mut self, kind: RequestKind, action: Arc<dyn GrantAction>) -> Self {
        self.entries.entry(kind).or_default().action = Some(action);
        self
    }

    /// Register the same probe and action for every kind that needs them
    #[must_use]
    pub fn with_all(mut self, probe: &Arc<dyn GrantProbe>, action: &Arc<dyn GrantAction>) -> Self {
        for kind in RequestKind::ALL {
            if !kind.skips_probe() {
                self = self.with_probe(kind, Arc::clone(probe));
            }
            self = self.with_action(kind, Arc::clone(action));
        }
        self
    }

    /// Check that every kind has an action and every probed kind has a probe
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MissingEntry`] for the first incomplete kind.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for kind in RequestKind::ALL {
            let entry = self.entries.get(&kind);
            if !kind.skips_probe() && entry.and_then(|e| e.probe.as_ref()).is_none() {
                return Err(CatalogError::MissingEntry { kind, missing: "probe" });
            }
            if entry.and_then(|e| e.action.as_ref()).is_none() {
                return Err(CatalogError::MissingEntry { kind, missing: "action" });
            }
        }
        Ok(())
    }

    /// Probe `kind`, folding failures into [`GrantState::Undetermined`]
    ///
    /// Kinds that skip probing report `Undetermined` without calling anything.
    pub async fn grant_state(&self, kind: RequestKind) -> GrantState {
        if kind.skips_probe() {
            return GrantState::Undetermined;
        }

        let Some(probe) = self.entries.get(&kind).and_then(|e| e.probe.clone()) else {
            tracing::warn!(%kind, "No probe registered, presenting request");
            return GrantState::Undetermined;
        };

        match probe.probe(kind).await {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(%error, "Probe failed, treating as undetermined");
                GrantState::Undetermined
            },
        }
    }

    /// Run the action for `kind`, folding failures into `false`
    pub async fn perform(&self, kind: RequestKind) -> bool {
        let Some(action) = self.entries.get(&kind).and_then(|e| e.action.clone()) else {
            tracing::warn!(%kind, "No action registered, treating as denied");
            return false;
        };

        match action.perform(kind).await {
            Ok(granted) => granted,
            Err(error) => {
                tracing::warn!(%error, "Action failed, treating as denied");
                false
            },
        }
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.entries.keys().collect();
        kinds.sort();
        f.debug_struct("Catalog").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedAction, ScriptedProbe};

    fn complete_catalog(probe: Arc<ScriptedProbe>, action: Arc<ScriptedAction>) -> Catalog {
        let probe: Arc<dyn GrantProbe> = probe;
        let action: Arc<dyn GrantAction> = action;
        Catalog::new().with_all(&probe, &action)
    }

    #[test]
    fn test_every_kind_has_metadata() {
        for kind in RequestKind::ALL {
            let metadata = kind.metadata();
            assert!(!metadata.title.is_empty(), "{kind} has no title");
            assert!(!metadata.cta.is_empty(), "{kind} has no cta");
        }
        assert_eq!(RequestKind::LocationAccess.metadata().symbol, "location.circle");
        assert_eq!(RequestKind::CameraAccess.metadata().dismiss, "Dismiss");
        assert_eq!(RequestKind::AppRating.metadata().dismiss, "Later");
    }

    #[test]
    fn test_only_app_rating_skips_probe() {
        let skipping: Vec<_> = RequestKind::ALL
            .into_iter()
            .filter(|k| k.skips_probe())
            .collect();
        assert_eq!(skipping, vec![RequestKind::AppRating]);
    }

    #[test]
    fn test_validate_reports_missing_probe() {
        let action: Arc<dyn GrantAction> = Arc::new(ScriptedAction::succeeding());
        let catalog = Catalog::new().with_action(RequestKind::CameraAccess, action);

        assert_eq!(
            catalog.validate(),
            Err(CatalogError::MissingEntry {
                kind: RequestKind::LocationAccess,
                missing: "probe",
            })
        );
    }

    #[test]
    fn test_validate_accepts_app_rating_without_probe() {
        let catalog = complete_catalog(
            Arc::new(ScriptedProbe::always(GrantState::Granted)),
            Arc::new(ScriptedAction::succeeding()),
        );
        assert_eq!(catalog.validate(), Ok(()));
    }

    #[test]
    fn test_validate_reports_missing_action() {
        let probe: Arc<dyn GrantProbe> = Arc::new(ScriptedProbe::always(GrantState::Granted));
        let mut catalog = Catalog::new();
        for kind in RequestKind::ALL {
            catalog = catalog.with_probe(kind, Arc::clone(&probe));
        }

        assert_eq!(
            catalog.validate().map_err(|e| e.to_string()),
            Err("No action registered for location_access".to_string())
        );
    }

    #[tokio::test]
    async fn test_probe_error_is_undetermined() {
        let probe = Arc::new(ScriptedProbe::failing());
        let catalog = complete_catalog(Arc::clone(&probe), Arc::new(ScriptedAction::succeeding()));

        let state = catalog.grant_state(RequestKind::CameraAccess).await;
        assert_eq!(state, GrantState::Undetermined);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_app_rating_is_never_probed() {
        let probe = Arc::new(ScriptedProbe::always(GrantState::Granted));
        let catalog = complete_catalog(Arc::clone(&probe), Arc::new(ScriptedAction::succeeding()));

        let state = catalog.grant_state(RequestKind::AppRating).await;
        assert_eq!(state, GrantState::Undetermined);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_action_error_is_denial() {
        let catalog = complete_catalog(
            Arc::new(ScriptedProbe::always(GrantState::Denied)),
            Arc::new(ScriptedAction::failing()),
        );

        assert!(!catalog.perform(RequestKind::MicrophoneAccess).await);
    }
}
