//! Shared fixtures for hub integration tests

#![allow(dead_code)]

use promptbus::catalog::{Catalog, GrantAction, GrantProbe, SettingsOpener};
use promptbus::config::BusConfig;
use promptbus::hub::{Collaborators, Hub, HubError};
use promptbus::notification::HapticsEngine;
use promptbus::mock::{RecordingHaptics, RecordingSettings, ScriptedAction, ScriptedProbe};
use promptbus::rating::RatingProgress;
use promptbus_testing::{init_test_tracing, test_clock};
use std::sync::Arc;
use std::time::Duration;

/// A running hub with handles on its scripted collaborators
pub struct Fixture {
    pub hub: Hub,
    pub probe: Arc<ScriptedProbe>,
    pub action: Arc<ScriptedAction>,
    pub settings: Arc<RecordingSettings>,
    pub haptics: Arc<RecordingHaptics>,
}

pub fn start(probe: Arc<ScriptedProbe>, action: Arc<ScriptedAction>) -> Result<Fixture, HubError> {
    start_with(BusConfig::default(), probe, action)
}

pub fn start_with(
    config: BusConfig,
    probe: Arc<ScriptedProbe>,
    action: Arc<ScriptedAction>,
) -> Result<Fixture, HubError> {
    start_restored(config, RatingProgress::default(), probe, action)
}

/// Start a hub that resumes saved rating progress
pub fn start_restored(
    config: BusConfig,
    progress: RatingProgress,
    probe: Arc<ScriptedProbe>,
    action: Arc<ScriptedAction>,
) -> Result<Fixture, HubError> {
    init_test_tracing();

    let dyn_probe: Arc<dyn GrantProbe> = Arc::clone(&probe) as Arc<dyn GrantProbe>;
    let dyn_action: Arc<dyn GrantAction> = Arc::clone(&action) as Arc<dyn GrantAction>;
    let settings = Arc::new(RecordingSettings::new());
    let haptics = Arc::new(RecordingHaptics::new());

    let collaborators = Collaborators::new(
        Arc::clone(&settings) as Arc<dyn SettingsOpener>,
        Arc::clone(&haptics) as Arc<dyn HapticsEngine>,
    )
    .with_clock(Arc::new(test_clock()));

    let hub = Hub::start_with_rating(
        config,
        Catalog::new().with_all(&dyn_probe, &dyn_action),
        collaborators,
        progress,
    )?;

    Ok(Fixture {
        hub,
        probe,
        action,
        settings,
        haptics,
    })
}

/// Let every ready task run (bus pumps, probes, actions, callbacks)
///
/// With paused time the runtime only advances the clock once all tasks are
/// idle, so this returns after the hub has caught up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
