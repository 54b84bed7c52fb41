//! The auto-config workflow: a single-flight pipeline that refreshes and curates profiles.
//!
//! A run goes through up to four steps, in order:
//!
//! 1. **Import** - download the candidate list, keep only lines never seen before, and
//!    hand them to the [`ProfileStore`]
//! 2. **Test** (`test_after_import`) - latency-test every profile in scope
//! 3. **Prune** (`remove_invalid_after_test`) - delete profiles without a valid result
//! 4. **Select** (`select_best_after_test`) - promote the fastest profile to active
//!
//! Each step catches and logs its own failure (including a panicking collaborator)
//! and reports a neutral result, so a failed download never stops the tester from
//! running. The run always ends with a completion notice and a
//! [`Signal::ProfilesRefreshed`].
//!
//! # Single flight
//!
//! Runs are serialized through a [`WorkflowController`]. A trigger that arrives while
//! another run holds the controller returns [`WorkflowOutcome::SkippedBusy`] at once;
//! nothing is queued. The slot is released by dropping a [`RunPermit`], so it is
//! returned on every exit path.

pub mod controller;


pub use controller::{MAX_CONCURRENT_RUNS, RunPermit, RunState, WorkflowController};

use crate::events::{Notifier, Signal};
use crate::metrics::WorkflowMetrics;
use crate::models::{AppConfig, SpeedTestResult};
use crate::services::{AutoConfigFetcher, ConfigFetcher, ProfileStore, SpeedTester, select_best};
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

/// External collaborators a workflow delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn ConfigFetcher>,
    pub store: Arc<dyn ProfileStore>,
    pub tester: Arc<dyn SpeedTester>,
    pub notifier: Arc<dyn Notifier>,
}

/// What a completed run accomplished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowReport {
    /// Profiles added by the import step
    pub imported: usize,

    /// Profiles handed to the speed tester
    pub tested: usize,

    /// Profiles deleted by the prune step
    pub removed: usize,

    /// Profile newly made active by the select step
    pub selected: Option<String>,
}

/// Result of a [`AutoConfigWorkflow::run_workflow`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Settings absent, disabled, or without a URL
    SkippedDisabled,

    /// Another run held the controller
    SkippedBusy,

    Completed(WorkflowReport),
}

/// Drives the import → test → prune → select pipeline.
///
/// Settings are read from a [`watch`] channel owned by the host, and a snapshot is
/// taken at the start of each run, so changes made while a run is in flight apply
/// to the next one.
pub struct AutoConfigWorkflow {
    config: watch::Receiver<AppConfig>,
    history_path: Utf8PathBuf,
    controller: WorkflowController,
    collaborators: Collaborators,
    speed_test_updates: Option<UnboundedSender<SpeedTestResult>>,
    metrics: Arc<WorkflowMetrics>,
}

impl AutoConfigWorkflow {
    /// Create a workflow.
    ///
    /// # Arguments
    /// * `config` - Settings channel; read once per run
    /// * `history_path` - File holding previously imported config lines
    /// * `controller` - Single-flight guard shared with other triggers
    /// * `collaborators` - Fetcher, store, tester and notifier to delegate to
    pub fn new<P: AsRef<Utf8Path>>(
        config: watch::Receiver<AppConfig>,
        history_path: P,
        controller: WorkflowController,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            history_path: history_path.as_ref().to_path_buf(),
            controller,
            collaborators,
            speed_test_updates: None,
            metrics: Arc::new(WorkflowMetrics::new()),
        }
    }

    /// Forward every per-profile speed test result to `tx`
    pub fn with_speed_test_updates(mut self, tx: UnboundedSender<SpeedTestResult>) -> Self {
        self.speed_test_updates = Some(tx);
        self
    }

    /// Record into shared metrics instead of a private instance
    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn controller(&self) -> &WorkflowController {
        &self.controller
    }

    pub fn metrics(&self) -> &Arc<WorkflowMetrics> {
        &self.metrics
    }

    /// Run the pipeline once, unless disabled or already running.
    pub async fn run_workflow(&self) -> WorkflowOutcome {
        let config = self.config.borrow().clone();

        let Some(settings) = config.auto_config.as_ref() else {
            tracing::info!("Auto config is not configured - skipping");
            self.metrics.record_skipped_disabled();
            return WorkflowOutcome::SkippedDisabled;
        };

        tracing::debug!(
            "Auto config settings: enabled={}, url={}",
            settings.enabled,
            settings.url.as_deref().unwrap_or("<none>")
        );

        let Some(url) = settings.active_url() else {
            tracing::info!("Auto config is disabled or URL is empty - skipping");
            self.metrics.record_skipped_disabled();
            return WorkflowOutcome::SkippedDisabled;
        };

        let Some(_permit) = self.controller.try_begin() else {
            tracing::info!("Auto config workflow already running, skipping");
            self.metrics.record_skipped_busy();
            return WorkflowOutcome::SkippedBusy;
        };

        self.metrics.record_run_started();
        let start = Instant::now();
        let scope = config.sub_index_id.as_str();
        let notifier = &self.collaborators.notifier;

        tracing::info!("Starting auto config workflow");
        notifier.notify("Starting auto config workflow...");

        let mut report = WorkflowReport {
            imported: self.run_step("Import", self.import_new_configs(url, settings.use_proxy, scope)).await,
            ..Default::default()
        };

        if settings.test_after_import {
            report.tested = self.run_step("Speed test", self.test_all_configs(scope)).await;
        }

        if settings.remove_invalid_after_test {
            report.removed = self.run_step("Remove invalid", self.remove_invalid_configs(scope)).await;
        }

        if settings.select_best_after_test {
            report.selected = self.run_step("Select best", self.select_best_server(scope)).await;
        }

        tracing::info!(
            "Auto config workflow completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            report
        );
        notifier.notify("Auto config workflow completed");
        notifier.publish(Signal::ProfilesRefreshed);

        self.metrics.record_run_time(start.elapsed());
        WorkflowOutcome::Completed(report)
    }

    /// Run one step, treating a panic inside it like any other step failure
    async fn run_step<T, F>(&self, step: &str, fut: F) -> T
    where
        T: Default,
        F: Future<Output = Result<T>>,
    {
        let result = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
        };
        self.settle(step, result)
    }

    /// Collapse a step result to its value, logging a failure as the neutral default
    fn settle<T: Default>(&self, step: &str, result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("{} step failed: {:#}", step, e);
                self.metrics.record_step_failure();
                T::default()
            }
        }
    }

    async fn import_new_configs(&self, url: &str, use_proxy: bool, scope: &str) -> Result<usize> {
        tracing::info!("Fetching configs from URL");

        let mut fetcher =
            AutoConfigFetcher::new(Arc::clone(&self.collaborators.fetcher), &self.history_path).await;
        let new_configs = fetcher.new_configs_only(url, use_proxy).await;

        if new_configs.is_empty() {
            tracing::info!("No new configs to import");
            return Ok(0);
        }

        let added = self
            .collaborators
            .store
            .add_batch(&new_configs, scope)
            .await
            .with_context(|| format!("Failed to import {} new configs", new_configs.len()))?;

        if added > 0 {
            tracing::info!("Imported {} new servers", added);
            self.collaborators
                .notifier
                .notify(&format!("Imported {} new servers", added));
            self.collaborators.notifier.publish(Signal::SubscriptionsRefreshed);
            self.metrics.record_imported(added);
        }

        Ok(added)
    }

    async fn test_all_configs(&self, scope: &str) -> Result<usize> {
        let profiles = self
            .collaborators
            .store
            .list_profiles(scope)
            .await
            .context("Failed to list profiles for testing")?;

        if profiles.is_empty() {
            tracing::info!("No profiles to test");
            return Ok(0);
        }

        let count = profiles.len();
        tracing::info!("Testing {} servers", count);
        self.collaborators
            .notifier
            .notify(&format!("Testing {} servers...", count));

        self.collaborators
            .tester
            .run(profiles, self.speed_test_updates.clone())
            .await
            .context("Speed test failed")?;

        tracing::info!("Speed test completed");
        self.metrics.record_tested(count);
        Ok(count)
    }

    async fn remove_invalid_configs(&self, scope: &str) -> Result<usize> {
        let removed = self
            .collaborators
            .store
            .remove_invalid(scope)
            .await
            .context("Failed to remove invalid profiles")?;

        if removed > 0 {
            tracing::info!("Removed {} invalid servers", removed);
            self.collaborators
                .notifier
                .notify(&format!("Removed {} invalid servers", removed));
            self.metrics.record_removed(removed);
        }

        Ok(removed)
    }

    async fn select_best_server(&self, scope: &str) -> Result<Option<String>> {
        let store = &self.collaborators.store;

        let latencies = store
            .list_latency_results()
            .await
            .context("Failed to list latency results")?;
        let profiles = store
            .list_profiles(scope)
            .await
            .context("Failed to list profiles for selection")?;

        if profiles.is_empty() {
            tracing::info!("No profiles to select from");
            return Ok(None);
        }

        let Some(best) = select_best(&profiles, &latencies) else {
            tracing::info!("No valid profiles with positive delay found");
            return Ok(None);
        };

        let delay = best.delay_ms.unwrap_or_default();
        tracing::info!("Best server {} has delay {}ms", best.index_id, delay);

        let active = store
            .active_profile_id()
            .await
            .context("Failed to read active profile")?;
        if active.as_deref() == Some(best.index_id.as_str()) {
            tracing::info!("Best server is already active");
            return Ok(None);
        }

        match store.set_active(&best.index_id).await {
            Ok(()) => {
                tracing::info!("Set best server as active");
                self.collaborators
                    .notifier
                    .notify(&format!("Selected best server (Delay: {}ms)", delay));
                self.collaborators.notifier.publish(Signal::ReloadRequested);
                self.metrics.record_best_selected();
                Ok(Some(best.index_id))
            }
            Err(e) => {
                tracing::warn!("Failed to set best server {} as active: {:#}", best.index_id, e);
                self.collaborators
                    .notifier
                    .notify("Failed to activate best server");
                Ok(None)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
