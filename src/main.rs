//! AutoConfig - one refresh-and-curate pass over the local proxy profiles.
//!
//! # Overview
//!
//! Each invocation runs the workflow once and exits; scheduling is left to whatever
//! launches the binary (cron, a systemd timer, a GUI). It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime
//! - Configuration loading ([`ConfigManager`])
//! - The bundled collaborators (HTTP fetcher, YAML profile store, TCP speed tester,
//!   event bus)
//!
//! # Execution Flow
//!
//! 1. Initialize logging → logs/autoconfig.<date>
//! 2. Load `AutoConfig Data/autoconfig.yaml` (plus `AUTOCONFIG_*` overrides)
//! 3. Open the profile database and wire the collaborators
//! 4. Run the workflow once and print notices as they arrive
//! 5. Log the metrics summary and shut down
//!
//! # Configuration Files
//!
//! Expected in `AutoConfig Data/`:
//! - `autoconfig.yaml`: Auto-config switches, subscription scope, timeouts
//! - `auto_config_previous.txt`: Lines already imported (created on first import)
//! - `profiles.yaml`: Profile database (created on first import)

use anyhow::Result;
use autoconfig::logging::{LogSettings, init_logging};
use autoconfig::metrics::WorkflowMetrics;
use autoconfig::models::SpeedTestResult;
use autoconfig::services::{HttpConfigFetcher, TcpSpeedTester, YamlProfileStore};
use autoconfig::{
    APP_NAME, AutoConfigWorkflow, Collaborators, ConfigManager, EventBus, VERSION, WorkflowController,
    WorkflowOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Directory holding the settings document, history and profile database
const CONFIG_DIR: &str = "AutoConfig Data";

fn main() -> Result<()> {
    let mut log_settings = LogSettings::new("logs", APP_NAME);
    log_settings.debug = std::env::var_os("AUTOCONFIG_DEBUG").is_some();
    let _log_guard = init_logging(&log_settings)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("autoconfig-worker")
        .build()?;

    let result = runtime.block_on(run());

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let app_config = config_manager.load_app_config()?;

    let history_path = config_manager.history_path(&app_config);
    let store = Arc::new(YamlProfileStore::open(config_manager.profiles_path(&app_config)).await?);

    let bus = EventBus::new();
    let mut notices = bus.subscribe_notices();
    let printer = tokio::spawn(async move {
        while let Ok(message) = notices.recv().await {
            println!("{}", message);
        }
    });

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<SpeedTestResult>();
    let progress = tokio::spawn(async move {
        while let Some(result) = updates_rx.recv().await {
            tracing::info!("Speed test {}: {}", result.index_id, result.message);
        }
    });

    let collaborators = Collaborators {
        fetcher: Arc::new(HttpConfigFetcher::new(Duration::from_secs(
            app_config.fetch_timeout_secs,
        ))?),
        store: store.clone(),
        tester: Arc::new(TcpSpeedTester::new(
            store,
            Duration::from_millis(app_config.speedtest_timeout_ms),
        )),
        notifier: Arc::new(bus.clone()),
    };

    let metrics = Arc::new(WorkflowMetrics::new());
    let (_config_tx, config_rx) = watch::channel(app_config);

    let workflow = AutoConfigWorkflow::new(
        config_rx,
        history_path,
        WorkflowController::new(),
        collaborators,
    )
    .with_speed_test_updates(updates_tx)
    .with_metrics(metrics.clone());

    match workflow.run_workflow().await {
        WorkflowOutcome::Completed(report) => tracing::info!("Run finished: {:?}", report),
        WorkflowOutcome::SkippedDisabled => {
            tracing::warn!("Auto config is disabled; set auto_config.enabled and auto_config.url")
        }
        WorkflowOutcome::SkippedBusy => tracing::warn!("Another run is in progress"),
    }

    // Close the channels so the printer tasks finish
    drop(workflow);
    drop(bus);
    let _ = progress.await;
    let _ = printer.await;

    metrics.log_summary();
    Ok(())
}
