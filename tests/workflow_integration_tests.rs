//! Integration tests for AutoConfigWorkflow with the bundled collaborators
//!
//! These tests verify:
//! - A full run against a real YAML profile store and TCP speed tester
//! - History carried between runs
//! - Single-flight rejection while another run is in progress

use anyhow::Result;
use async_trait::async_trait;
use autoconfig::models::{ProfileItem, SpeedTestResult};
use autoconfig::services::{ConfigFetcher, ProfileStore, SpeedTester, TcpSpeedTester, YamlProfileStore};
use autoconfig::{
    AppConfig, AutoConfigSettings, AutoConfigWorkflow, Collaborators, EventBus, Signal,
    WorkflowController, WorkflowOutcome, WorkflowReport,
};
use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Notify, watch};
use tokio::time::timeout;

/// Serves a fixed body for every URL
struct StaticFetcher {
    body: String,
}

#[async_trait]
impl ConfigFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, _use_proxy: bool) -> Option<String> {
        Some(self.body.clone())
    }
}

/// Blocks inside `run` until released, to hold a workflow in its test step
struct GatedTester {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl SpeedTester for GatedTester {
    async fn run(
        &self,
        _profiles: Vec<ProfileItem>,
        _updates: Option<UnboundedSender<SpeedTestResult>>,
    ) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

fn config(test: bool, remove: bool, select: bool) -> AppConfig {
    AppConfig {
        auto_config: Some(AutoConfigSettings {
            enabled: true,
            url: Some("https://example.com/list.txt".to_string()),
            test_after_import: test,
            remove_invalid_after_test: remove,
            select_best_after_test: select,
            use_proxy: false,
        }),
        ..Default::default()
    }
}

fn paths(temp_dir: &TempDir) -> (Utf8PathBuf, Utf8PathBuf) {
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (dir.join("auto_config_previous.txt"), dir.join("profiles.yaml"))
}

#[tokio::test]
async fn test_end_to_end_with_bundled_store_and_tester() {
    let temp_dir = TempDir::new().unwrap();
    let (history_path, profiles_path) = paths(&temp_dir);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = listener.local_addr().unwrap().port();
    let closed_port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let body = format!(
        "trojan://pw@127.0.0.1:{}#up\n\ntrojan://pw@127.0.0.1:{}#down\nvmess://opaque\n",
        open_port, closed_port
    );

    let store = Arc::new(YamlProfileStore::open(&profiles_path).await.unwrap());
    let bus = EventBus::new();
    let mut signals = bus.subscribe_signals();
    let controller = WorkflowController::new();

    let collaborators = Collaborators {
        fetcher: Arc::new(StaticFetcher { body }),
        store: store.clone(),
        tester: Arc::new(TcpSpeedTester::new(store.clone(), Duration::from_secs(2))),
        notifier: Arc::new(bus.clone()),
    };
    let (_tx, rx) = watch::channel(config(true, true, true));
    let workflow = AutoConfigWorkflow::new(rx, &history_path, controller.clone(), collaborators);

    let outcome = workflow.run_workflow().await;
    let WorkflowOutcome::Completed(report) = outcome else {
        panic!("Expected a completed run, got {:?}", outcome);
    };

    // Three new lines, but the opaque vmess line is not importable
    assert_eq!(report.imported, 2);
    assert_eq!(report.tested, 2);
    assert_eq!(report.removed, 1);

    let remaining = store.list_profiles("").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].port, open_port);
    assert_eq!(report.selected.as_deref(), Some(remaining[0].index_id.as_str()));
    assert_eq!(
        store.active_profile_id().await.unwrap().as_deref(),
        Some(remaining[0].index_id.as_str())
    );

    let mut received = Vec::new();
    while let Ok(signal) = signals.try_recv() {
        received.push(signal);
    }
    assert_eq!(
        received,
        vec![
            Signal::SubscriptionsRefreshed,
            Signal::ReloadRequested,
            Signal::ProfilesRefreshed,
        ]
    );

    // Same list again: nothing new, best already active
    let second = workflow.run_workflow().await;
    assert_eq!(
        second,
        WorkflowOutcome::Completed(WorkflowReport {
            imported: 0,
            tested: 1,
            removed: 0,
            selected: None,
        })
    );

    drop(listener);
}

#[tokio::test]
async fn test_concurrent_trigger_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let (history_path, profiles_path) = paths(&temp_dir);

    let store = Arc::new(YamlProfileStore::open(&profiles_path).await.unwrap());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let controller = WorkflowController::new();

    let build = |controller: WorkflowController| {
        let collaborators = Collaborators {
            fetcher: Arc::new(StaticFetcher {
                body: "trojan://pw@127.0.0.1:9#gate".to_string(),
            }),
            store: store.clone(),
            tester: Arc::new(GatedTester {
                entered: entered.clone(),
                release: release.clone(),
            }),
            notifier: Arc::new(EventBus::new()),
        };
        let (_tx, rx) = watch::channel(config(true, false, false));
        AutoConfigWorkflow::new(rx, &history_path, controller, collaborators)
    };

    let first = Arc::new(build(controller.clone()));
    let second = build(controller.clone());

    let running = {
        let first = Arc::clone(&first);
        tokio::spawn(async move { first.run_workflow().await })
    };

    timeout(Duration::from_secs(5), entered.notified())
        .await
        .expect("First run never reached the test step");
    assert!(controller.is_running());

    assert_eq!(second.run_workflow().await, WorkflowOutcome::SkippedBusy);

    release.notify_one();
    let outcome = timeout(Duration::from_secs(5), running)
        .await
        .expect("First run did not finish")
        .expect("First run panicked");

    assert_eq!(
        outcome,
        WorkflowOutcome::Completed(WorkflowReport {
            imported: 1,
            tested: 1,
            ..Default::default()
        })
    );
    assert!(!controller.is_running());

    // With the slot free, the second workflow proceeds; history already has the line
    // A stored permit lets the gated tester pass straight through
    release.notify_one();
    let outcome = second.run_workflow().await;
    assert!(matches!(
        outcome,
        WorkflowOutcome::Completed(WorkflowReport { imported: 0, tested: 1, .. })
    ));
}
