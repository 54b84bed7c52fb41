// AutoConfig - Fetch, deduplicate, test and curate remote proxy server profiles
//
// This is the library crate containing the fetch-diff core, the single-flight workflow
// and the bundled collaborator implementations. The binary crate (main.rs) runs one
// workflow pass against the config directory.

pub mod config;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod workflow;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use events::{EventBus, Notifier, Signal};
pub use models::{AppConfig, AutoConfigSettings};
pub use workflow::{AutoConfigWorkflow, Collaborators, WorkflowController, WorkflowOutcome, WorkflowReport};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
