use serde::{Deserialize, Serialize};

/// A proxy server profile as held by a [`ProfileStore`](crate::services::ProfileStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileItem {
    pub index_id: String,

    /// Subscription this profile belongs to (empty for none)
    #[serde(default)]
    pub sub_id: String,

    pub address: String,
    pub port: u16,

    #[serde(default)]
    pub remarks: String,

    /// The configuration line the profile was imported from
    pub raw: String,
}

/// Latest latency measurement recorded for a profile.
///
/// A `delay_ms` of zero or below means the test failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyResult {
    pub index_id: String,
    pub delay_ms: i64,
}

impl LatencyResult {
    pub fn new(index_id: impl Into<String>, delay_ms: i64) -> Self {
        Self {
            index_id: index_id.into(),
            delay_ms,
        }
    }
}

/// Per-profile output of a speed test, forwarded to callers as it is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedTestResult {
    pub index_id: String,
    pub delay_ms: i64,
    pub message: String,
}

impl SpeedTestResult {
    pub fn is_valid(&self) -> bool {
        self.delay_ms > 0
    }
}

/// A profile ranked by measured latency; `delay_ms` is `None` when untested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCandidate {
    pub index_id: String,
    pub delay_ms: Option<i64>,
}
