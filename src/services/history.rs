use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

/// A single normalized candidate configuration line.
///
/// Always trimmed and never empty. Two lines are the same history entry when they
/// compare equal ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigLine(String);

impl ConfigLine {
    /// Trim `raw`, returning `None` if nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Case-folded identity used for set membership
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConfigLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors from reading or writing the history file
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to read history file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write history file {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Durable set of previously seen configuration lines.
///
/// The set is loaded from a flat text file (one entry per line) when the tracker is
/// constructed and written back wholesale by [`persist`](Self::persist). Entries are
/// keyed case-insensitively; the first spelling seen is the one written to disk.
///
/// A tracker is meant to be short-lived: build a fresh one for each fetch so that
/// history always starts from what is on disk.
#[derive(Debug)]
pub struct ConfigDiffTracker {
    path: Utf8PathBuf,

    /// Lowercased key -> line as first seen
    entries: IndexMap<String, ConfigLine>,
}

impl ConfigDiffTracker {
    /// Load history from `path`.
    ///
    /// Never fails: a missing file yields an empty set, an unreadable one yields an
    /// empty set and a warning.
    pub async fn load<P: AsRef<Utf8Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut tracker = Self {
            path,
            entries: IndexMap::new(),
        };

        match tracker.read_entries().await {
            Ok(count) => {
                tracing::debug!("Loaded {} history entries from {}", count, tracker.path);
            }
            Err(e) => {
                tracing::warn!("{}; starting with empty history", e);
                tracker.entries.clear();
            }
        }

        tracker
    }

    async fn read_entries(&mut self) -> Result<usize, HistoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        for line in content.lines().filter_map(ConfigLine::parse) {
            self.entries.entry(line.key()).or_insert(line);
        }

        Ok(self.entries.len())
    }

    /// Return the lines of `raw_text` not seen before, in first-seen order.
    ///
    /// Every returned line is added to the in-memory set immediately, so a line that
    /// repeats within `raw_text` is reported once and a second call with the same
    /// text returns nothing. The set is not written to disk here.
    pub fn diff_new(&mut self, raw_text: &str) -> Vec<ConfigLine> {
        let mut new_lines = Vec::new();

        for line in raw_text.split(['\r', '\n']).filter_map(ConfigLine::parse) {
            let key = line.key();
            if !self.entries.contains_key(&key) {
                self.entries.insert(key, line.clone());
                new_lines.push(line);
            }
        }

        new_lines
    }

    /// Write the full set to disk, logging instead of failing.
    pub async fn persist(&self) {
        if let Err(e) = self.try_persist().await {
            tracing::warn!("{}; history kept in memory only", e);
        }
    }

    /// Write the full set to disk, overwriting previous contents.
    pub async fn try_persist(&self) -> Result<(), HistoryError> {
        let write_err = |source| HistoryError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut content = String::new();
        for line in self.entries.values() {
            content.push_str(line.as_str());
            content.push('\n');
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(write_err)?;

        tracing::debug!("Saved {} history entries to {}", self.entries.len(), self.path);
        Ok(())
    }

    /// Forget every entry and persist the empty set.
    pub async fn clear(&mut self) {
        self.entries.clear();
        self.persist().await;
    }

    pub fn contains(&self, line: &str) -> bool {
        ConfigLine::parse(line).is_some_and(|line| self.entries.contains_key(&line.key()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConfigLine> {
        self.entries.values()
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn history_path(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().join("history.txt")).unwrap()
    }

    fn strings(lines: &[ConfigLine]) -> Vec<&str> {
        lines.iter().map(ConfigLine::as_str).collect()
    }

    #[test]
    fn test_config_line_parse() {
        assert_eq!(ConfigLine::parse("  abc \t").unwrap().as_str(), "abc");
        assert!(ConfigLine::parse("   ").is_none());
        assert!(ConfigLine::parse("").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = ConfigDiffTracker::load(history_path(&temp_dir)).await;
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_and_empty_lines_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let mut tracker = ConfigDiffTracker::load(history_path(&temp_dir)).await;

        let new_lines = tracker.diff_new("  \n\nfoo\n  \n");
        assert_eq!(strings(&new_lines), vec!["foo"]);
    }

    #[tokio::test]
    async fn test_diff_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut tracker = ConfigDiffTracker::load(history_path(&temp_dir)).await;
        let raw = "vless://a@host:1\r\ntrojan://b@host:2\r\n";

        assert_eq!(tracker.diff_new(raw).len(), 2);
        assert!(tracker.diff_new(raw).is_empty());
    }

    #[tokio::test]
    async fn test_case_insensitive_membership() {
        let temp_dir = TempDir::new().unwrap();
        let mut tracker = ConfigDiffTracker::load(history_path(&temp_dir)).await;

        assert_eq!(strings(&tracker.diff_new("ABC")), vec!["ABC"]);
        assert!(tracker.diff_new("abc").is_empty());
        assert!(tracker.contains(" aBc "));
    }

    #[tokio::test]
    async fn test_repeat_within_one_call_reported_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut tracker = ConfigDiffTracker::load(history_path(&temp_dir)).await;

        let new_lines = tracker.diff_new("b\na\nB\nc\na");
        assert_eq!(strings(&new_lines), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = history_path(&temp_dir);

        let mut tracker = ConfigDiffTracker::load(&path).await;
        tracker.diff_new("one\ntwo\nthree");
        tracker.try_persist().await.unwrap();

        let reloaded = ConfigDiffTracker::load(&path).await;
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.contains("TWO"));
    }

    #[tokio::test]
    async fn test_clear_persists_empty_set() {
        let temp_dir = TempDir::new().unwrap();
        let path = history_path(&temp_dir);

        let mut tracker = ConfigDiffTracker::load(&path).await;
        tracker.diff_new("one\ntwo");
        tracker.persist().await;
        tracker.clear().await;

        assert!(tracker.is_empty());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.is_empty());
        assert!(ConfigDiffTracker::load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = history_path(&temp_dir);
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x9f]).unwrap();

        let tracker = ConfigDiffTracker::load(&path).await;
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_memory() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes the write fail
        let path = history_path(&temp_dir);
        std::fs::create_dir_all(&path).unwrap();

        let mut tracker = ConfigDiffTracker::load(&path).await;
        tracker.diff_new("kept");

        assert!(matches!(
            tracker.try_persist().await,
            Err(HistoryError::Write { .. })
        ));
        tracker.persist().await;
        assert!(tracker.contains("kept"));
    }
}
