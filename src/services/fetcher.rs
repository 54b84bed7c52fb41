use crate::services::history::{ConfigDiffTracker, ConfigLine};
use anyhow::{Context, Result};
use async_trait::async_trait;
use camino::Utf8Path;
use std::sync::Arc;
use std::time::Duration;

/// Downloads the raw, multi-line candidate list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetch `url` as text, returning `None` on any failure
    async fn fetch(&self, url: &str, use_proxy: bool) -> Option<String>;
}

/// [`ConfigFetcher`] backed by `reqwest`.
///
/// Holds two clients so that `use_proxy` can be decided per call: one honours the
/// system proxy settings, the other bypasses them.
pub struct HttpConfigFetcher {
    proxied: reqwest::Client,
    direct: reqwest::Client,
}

impl HttpConfigFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let user_agent = format!("{}/{}", crate::APP_NAME, crate::VERSION);

        let proxied = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        let direct = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .no_proxy()
            .build()
            .context("Failed to create direct HTTP client")?;

        Ok(Self { proxied, direct })
    }

    async fn download(&self, url: &str, use_proxy: bool) -> Result<String> {
        let client = if use_proxy { &self.proxied } else { &self.direct };

        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Request to {} returned status {}", url, status);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", url))
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self, url: &str, use_proxy: bool) -> Option<String> {
        match self.download(url, use_proxy).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!("Download failed: {:#}", e);
                None
            }
        }
    }
}

/// Fetches a candidate list and reports only lines missing from history.
///
/// Wraps a freshly loaded [`ConfigDiffTracker`]; build one per workflow run.
pub struct AutoConfigFetcher {
    fetcher: Arc<dyn ConfigFetcher>,
    tracker: ConfigDiffTracker,
}

impl AutoConfigFetcher {
    /// Load history from `history_path` and pair it with `fetcher`
    pub async fn new<P: AsRef<Utf8Path>>(fetcher: Arc<dyn ConfigFetcher>, history_path: P) -> Self {
        let tracker = ConfigDiffTracker::load(history_path).await;
        Self { fetcher, tracker }
    }

    /// Download `url` as text. An empty URL is never requested.
    pub async fn fetch_configs(&self, url: &str, use_proxy: bool) -> Option<String> {
        if url.trim().is_empty() {
            return None;
        }

        tracing::info!("Fetching configs from: {}", url);
        self.fetcher.fetch(url, use_proxy).await
    }

    /// Download `url` and return the lines not seen in any earlier run.
    ///
    /// History is persisted only when at least one new line was found.
    pub async fn new_configs_only(&mut self, url: &str, use_proxy: bool) -> Vec<ConfigLine> {
        let all_configs = match self.fetch_configs(url, use_proxy).await {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                tracing::info!("Nothing downloaded from {}", url);
                return Vec::new();
            }
        };

        let new_configs = self.tracker.diff_new(&all_configs);

        if new_configs.is_empty() {
            tracing::info!("No new configs found");
            return new_configs;
        }

        self.tracker.persist().await;

        let total = listed_line_count(&all_configs);
        tracing::info!(
            "Found {} new configs out of {} total",
            new_configs.len(),
            total
        );

        new_configs
    }

    /// Forget all previously seen lines
    pub async fn clear_history(&mut self) {
        self.tracker.clear().await;
        tracing::info!("Cleared config history at {}", self.tracker.path());
    }

    pub fn tracker(&self) -> &ConfigDiffTracker {
        &self.tracker
    }
}

/// Non-empty pieces between line breaks; whitespace-only lines still count
fn listed_line_count(raw: &str) -> usize {
    raw.split(['\r', '\n']).filter(|line| !line.is_empty()).count()
}
