use crate::models::{ProfileItem, SpeedTestResult};
use crate::services::store::YamlProfileStore;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;

/// Delay recorded for a profile that could not be reached
pub const FAILED_DELAY_MS: i64 = -1;

/// Measures latency for a set of profiles and records the results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeedTester: Send + Sync {
    /// Test every profile in `profiles`, sending each result to `updates` as it completes
    async fn run(
        &self,
        profiles: Vec<ProfileItem>,
        updates: Option<UnboundedSender<SpeedTestResult>>,
    ) -> Result<()>;
}

/// [`SpeedTester`] that times a plain TCP connect to each profile's endpoint.
///
/// Results are written back to the [`YamlProfileStore`] so that pruning and
/// selection see them.
pub struct TcpSpeedTester {
    store: Arc<YamlProfileStore>,
    connect_timeout: Duration,
}

impl TcpSpeedTester {
    pub fn new(store: Arc<YamlProfileStore>, connect_timeout: Duration) -> Self {
        Self {
            store,
            connect_timeout,
        }
    }

    /// Time one TCP connect, returning the delay in milliseconds or [`FAILED_DELAY_MS`]
    pub async fn probe(&self, profile: &ProfileItem) -> (i64, String) {
        let target = (profile.address.as_str(), profile.port);
        let start = Instant::now();

        match timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
                // Sub-millisecond connects still count as reachable
                let delay = elapsed.max(1);
                (delay, format!("{}ms", delay))
            }
            Ok(Err(e)) => (FAILED_DELAY_MS, format!("Connect failed: {}", e)),
            Err(_) => (
                FAILED_DELAY_MS,
                format!("Timeout after {:?}", self.connect_timeout),
            ),
        }
    }
}

#[async_trait]
impl SpeedTester for TcpSpeedTester {
    async fn run(
        &self,
        profiles: Vec<ProfileItem>,
        updates: Option<UnboundedSender<SpeedTestResult>>,
    ) -> Result<()> {
        for profile in &profiles {
            let (delay_ms, message) = self.probe(profile).await;
            tracing::debug!(
                "Tested {} ({}:{}): {}",
                profile.remarks,
                profile.address,
                profile.port,
                message
            );

            // A lost write must not stop the remaining profiles from being tested
            if let Err(e) = self.store.record_latency(&profile.index_id, delay_ms).await {
                tracing::warn!("Failed to record result for {}: {:#}", profile.index_id, e);
            }

            if let Some(tx) = &updates {
                // Ignore send errors - it's OK if no one is listening
                let _ = tx.send(SpeedTestResult {
                    index_id: profile.index_id.clone(),
                    delay_ms,
                    message,
                });
            }
        }

        Ok(())
    }
}
