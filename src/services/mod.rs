//! Services module - the fetch-diff core and the collaborator seams the workflow drives.
//!
//! The services are **UI-agnostic** and have no dependency on how a run is triggered,
//! which keeps them testable in isolation.
//!
//! # Components
//!
//! - [`ConfigDiffTracker`]: Durable, case-insensitive set of previously seen config lines
//!   and the diffing logic that separates new lines from known ones
//! - [`AutoConfigFetcher`]: Downloads a candidate list and returns only unseen lines,
//!   persisting history when something new turns up
//! - [`select_best`]: Pure ranking of profiles by measured latency
//!
//! # Collaborator traits
//!
//! The workflow only talks to the outside world through these traits, each with a
//! bundled default implementation:
//!
//! | Trait             | Default                  | Concern                          |
//! |-------------------|--------------------------|----------------------------------|
//! | [`ConfigFetcher`] | [`HttpConfigFetcher`]    | Download the raw list (reqwest)  |
//! | [`ProfileStore`]  | [`YamlProfileStore`]     | Profile persistence (YAML file)  |
//! | [`SpeedTester`]   | [`TcpSpeedTester`]       | Latency measurement (TCP connect)|
//!
//! Notifications and signals go through [`crate::events::Notifier`].
//!
//! # Usage Example
//!
//! ```ignore
//! use autoconfig::services::{AutoConfigFetcher, HttpConfigFetcher};
//!
//! let http = Arc::new(HttpConfigFetcher::new(Duration::from_secs(30))?);
//! let mut fetcher = AutoConfigFetcher::new(http, "AutoConfig Data/auto_config_previous.txt").await;
//!
//! let new_lines = fetcher.new_configs_only("https://example.com/list.txt", false).await;
//! ```

pub mod fetcher;
pub mod history;
pub mod selection;
pub mod speedtest;
pub mod store;

pub use fetcher::{AutoConfigFetcher, ConfigFetcher, HttpConfigFetcher};
pub use history::{ConfigDiffTracker, ConfigLine, HistoryError};
pub use selection::{rank_candidates, select_best};
pub use speedtest::{SpeedTester, TcpSpeedTester};
pub use store::{ProfileDatabase, ProfileStore, StoreError, YamlProfileStore};
