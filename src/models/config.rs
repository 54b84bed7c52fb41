use serde::{Deserialize, Serialize};

/// Root settings document from `autoconfig.yaml`
///
/// Holds the auto-config switches plus the file names and timeouts used by the
/// bundled collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absent means the feature has never been configured
    #[serde(default)]
    pub auto_config: Option<AutoConfigSettings>,

    /// Subscription scope used when importing, testing and pruning profiles
    #[serde(default)]
    pub sub_index_id: String,

    #[serde(default = "default_history_file")]
    pub history_file: String,

    #[serde(default = "default_profiles_file")]
    pub profiles_file: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_speedtest_timeout_ms")]
    pub speedtest_timeout_ms: u64,
}

/// Switches for the refresh-and-curate workflow
///
/// Owned by the surrounding application; the workflow only reads a snapshot per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoConfigSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub test_after_import: bool,

    #[serde(default)]
    pub remove_invalid_after_test: bool,

    #[serde(default)]
    pub select_best_after_test: bool,

    /// Route the download through the system proxy
    #[serde(default)]
    pub use_proxy: bool,
}

impl AutoConfigSettings {
    /// The configured URL if the workflow is enabled and the URL is non-blank
    pub fn active_url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_config: None,
            sub_index_id: String::new(),
            history_file: default_history_file(),
            profiles_file: default_profiles_file(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            speedtest_timeout_ms: default_speedtest_timeout_ms(),
        }
    }
}

fn default_history_file() -> String {
    "auto_config_previous.txt".to_string()
}

fn default_profiles_file() -> String {
    "profiles.yaml".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_speedtest_timeout_ms() -> u64 {
    5000
}
