//! Data models for the AutoConfig application.
//!
//! This module contains the core data structures shared by the services and the workflow:
//! - [`AppConfig`]: Root settings document loaded from `autoconfig.yaml`
//! - [`AutoConfigSettings`]: Per-run switches for the refresh-and-curate workflow
//! - [`ProfileItem`]: A stored proxy server profile
//! - [`LatencyResult`] / [`SpeedTestResult`]: Latency measurements produced by a tester
//! - [`ProfileCandidate`]: A profile ranked for promotion to active
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: Config and profile structs derive `Serialize`/`Deserialize` for YAML persistence
//! - **Cloneable**: The workflow snapshots [`AppConfig`] at the start of every run
//! - **Passive**: No I/O happens here; services own reading and writing

pub mod config;
pub mod profile;

pub use config::{AppConfig, AutoConfigSettings};
pub use profile::{LatencyResult, ProfileCandidate, ProfileItem, SpeedTestResult};
