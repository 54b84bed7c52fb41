use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how verbosely to log
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Directory for the daily-rotated log files
    pub dir: Utf8PathBuf,

    /// File name prefix (e.g., "autoconfig")
    pub prefix: String,

    /// Use debug level instead of info when `RUST_LOG` is not set
    pub debug: bool,

    /// Also write human-readable output to the terminal
    pub console: bool,
}

impl LogSettings {
    pub fn new(dir: impl Into<Utf8PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            debug: false,
            console: true,
        }
    }

    /// Filter from `RUST_LOG`, falling back to the debug flag
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if self.debug {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        })
    }

    /// Create the log directory if it doesn't exist
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create log directory: {}", self.dir))?;
        }
        Ok(())
    }
}

/// Install the global subscriber: a rotating file layer plus an optional console layer.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep file logging active
pub fn init_logging(settings: &LogSettings) -> Result<WorkerGuard> {
    settings.ensure_dir()?;

    let file_appender = rolling::daily(&settings.dir, &settings.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = settings.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(settings.env_filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        settings.dir,
        settings.prefix,
        settings.debug,
        settings.console
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("a").join("logs")).unwrap();

        let settings = LogSettings::new(log_dir.clone(), "test");
        settings.ensure_dir().unwrap();

        assert!(log_dir.exists());
    }

    #[test]
    fn test_defaults() {
        let settings = LogSettings::new("logs", "autoconfig");
        assert!(!settings.debug);
        assert!(settings.console);
        assert_eq!(settings.prefix, "autoconfig");
    }
}
