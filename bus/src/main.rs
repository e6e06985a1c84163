//! Request bus demo binary
//!
//! Runs the bus against scripted platform collaborators and prints what a
//! renderer would see.

use anyhow::Context;
use promptbus::catalog::{
    Catalog, GrantAction, GrantProbe, GrantState, RequestKind, SettingsOpener,
};
use promptbus::config::BusConfig;
use promptbus::hub::{Collaborators, Hub};
use promptbus::lifecycle::LifecyclePhase;
use promptbus::mock::{
    RecordingHaptics, RecordingSettings, ResolutionLog, ScriptedAction, ScriptedProbe,
};
use promptbus::notification::{HapticsEngine, NotificationContent, NotificationType};
use promptbus_runtime::metrics::MetricsRecorder;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Let spawned probes, actions and callbacks run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn show(hub: &Hub) {
    match hub.presentation().await {
        Some(presented) => println!(
            "  Presented {} {}: \"{}\" [{}] [{}]{}",
            presented.ticket,
            presented.kind,
            presented.metadata.title,
            presented.cta_text,
            presented.dismiss_text,
            if presented.stale { " (stale)" } else { "" }
        ),
        None => println!("  Nothing presented"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptbus=info,promptbus_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = MetricsRecorder::install().context("installing metrics recorder")?;

    println!("=== promptbus demo ===\n");

    let config = BusConfig {
        notification_duration_ms: 1_500,
        ..BusConfig::default()
    }
    .with_env_overrides()?;

    let probe = Arc::new(ScriptedProbe::always(GrantState::Undetermined));
    probe.set(RequestKind::LocationAccess, GrantState::Granted);
    probe.set(RequestKind::CameraAccess, GrantState::Denied);

    let dyn_probe: Arc<dyn GrantProbe> = Arc::clone(&probe) as Arc<dyn GrantProbe>;
    let action: Arc<dyn GrantAction> = Arc::new(ScriptedAction::declining());
    let settings = Arc::new(RecordingSettings::new());
    let haptics = Arc::new(RecordingHaptics::new());

    let hub = Hub::start(
        config,
        Catalog::new().with_all(&dyn_probe, &action),
        Collaborators::new(
            Arc::clone(&settings) as Arc<dyn SettingsOpener>,
            Arc::clone(&haptics) as Arc<dyn HapticsEngine>,
        ),
    )?;

    println!(">>> Notification burst (4 emitted, {} visible)", hub.config().max_visible_notifications);
    for (index, kind) in [
        NotificationType::Info,
        NotificationType::Success,
        NotificationType::Warning,
        NotificationType::Error,
    ]
    .into_iter()
    .enumerate()
    {
        hub.emit_typed_notification(
            kind,
            NotificationContent::new(format!("Notice {}", index + 1), format!("{kind:?} message")),
            None,
            None,
        );
    }
    settle().await;
    for item in hub.notifications().await {
        println!("  {} - {}", item.content.title, item.content.message);
    }
    println!("  Haptics played: {:?}", haptics.played());

    println!("\n>>> Location is already granted");
    let location = ResolutionLog::new();
    hub.request_capability(
        RequestKind::LocationAccess,
        Some(Box::new(location.granted_callback())),
        Some(Box::new(location.dismissed_callback())),
    );
    settle().await;
    println!("  on_granted: {}, on_dismiss: {}", location.granted(), location.dismissed());
    show(&hub).await;

    println!("\n>>> Camera was denied, so the user is sent to Settings");
    let camera = ResolutionLog::new();
    hub.request_capability(
        RequestKind::CameraAccess,
        Some(Box::new(camera.granted_callback())),
        Some(Box::new(camera.dismissed_callback())),
    );
    settle().await;
    show(&hub).await;
    if let Some(presented) = hub.presentation().await {
        hub.accept(presented.ticket).await?;
        settle().await;
    }
    println!(
        "  Settings opened: {}, on_granted: {}, on_dismiss: {}",
        settings.opened(),
        camera.granted(),
        camera.dismissed()
    );

    println!("\n>>> Positive actions until the rating prompt");
    for count in 1..=hub.config().positive_action_threshold {
        if hub.record_positive_action() {
            println!("  Threshold reached after {count} actions");
        }
    }
    settle().await;
    show(&hub).await;

    println!("\n>>> App moves to the background");
    hub.set_phase(LifecyclePhase::Inactive).await?;
    show(&hub).await;
    hub.set_phase(LifecyclePhase::Background).await?;
    settle().await;
    show(&hub).await;

    println!("\n>>> Waiting for notification timers");
    tokio::time::sleep(hub.config().notification_duration() + Duration::from_millis(100)).await;
    println!("  Visible notifications: {}", hub.notifications().await.len());

    hub.shutdown().await?;

    if let Some(snapshot) = recorder.render() {
        println!("\n=== Metrics ===\n{snapshot}");
    }

    Ok(())
}
