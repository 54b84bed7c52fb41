use crate::models::{LatencyResult, ProfileItem};
use crate::services::history::ConfigLine;
use anyhow::{Context, Result};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Profile persistence consumed by the workflow.
///
/// Scopes are subscription ids; an empty scope means every profile.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Import configuration lines into subscription `sub_id`, returning how many profiles were added
    async fn add_batch(&self, lines: &[ConfigLine], sub_id: &str) -> Result<usize>;

    async fn list_profiles(&self, scope: &str) -> Result<Vec<ProfileItem>>;

    async fn list_latency_results(&self) -> Result<Vec<LatencyResult>>;

    /// Delete profiles in `scope` without a positive test result, returning how many were removed
    async fn remove_invalid(&self, scope: &str) -> Result<usize>;

    /// Make `index_id` the active profile. `Err` means the switch did not happen.
    async fn set_active(&self, index_id: &str) -> Result<()>;

    async fn active_profile_id(&self) -> Result<Option<String>>;
}

/// Errors raised by [`YamlProfileStore`]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Profile {0} not found")]
    ProfileNotFound(String),

    #[error("Failed to parse profile database {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

/// On-disk layout of the profile database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDatabase {
    #[serde(default)]
    pub active_id: Option<String>,

    #[serde(default)]
    pub profiles: Vec<ProfileItem>,

    /// Latest delay per profile id, in milliseconds
    #[serde(default)]
    pub latencies: IndexMap<String, i64>,
}

/// [`ProfileStore`] persisting a [`ProfileDatabase`] as YAML.
///
/// Every mutation rewrites the whole file.
pub struct YamlProfileStore {
    path: Utf8PathBuf,
    db: Mutex<ProfileDatabase>,
}

impl YamlProfileStore {
    /// Open the database at `path`; a missing file starts an empty database.
    pub async fn open<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let db = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => ProfileDatabase::default(),
            Ok(content) => serde_yaml_ng::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Profile database not found at {}, starting empty", path);
                ProfileDatabase::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read profile database: {}", path));
            }
        };

        tracing::debug!("Opened profile database {} ({} profiles)", path, db.profiles.len());

        Ok(Self {
            path,
            db: Mutex::new(db),
        })
    }

    /// Store the latest measured delay for `index_id`
    pub async fn record_latency(&self, index_id: &str, delay_ms: i64) -> Result<()> {
        let mut db = self.db.lock().await;
        db.latencies.insert(index_id.to_string(), delay_ms);
        self.save(&db).await
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    async fn save(&self, db: &ProfileDatabase) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(db).context("Failed to serialize profile database to YAML")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent))?;
        }

        tokio::fs::write(&self.path, yaml_string)
            .await
            .with_context(|| format!("Failed to write profile database: {}", self.path))
    }
}

/// Build a profile from a `scheme://[user@]host:port[#remarks]` line.
///
/// IPv6 hosts are stored without brackets.
pub fn parse_profile(line: &ConfigLine, sub_id: &str) -> Option<ProfileItem> {
    let url = url::Url::parse(line.as_str()).ok()?;
    let address = match url.host()? {
        // Bare address so it can be handed to a socket connect
        url::Host::Ipv6(addr) => addr.to_string(),
        url::Host::Ipv4(addr) => addr.to_string(),
        url::Host::Domain(domain) => domain.to_string(),
    };
    let port = url.port()?;

    let remarks = url
        .fragment()
        .map(|fragment| percent_decode_str(fragment).decode_utf8_lossy().into_owned())
        .filter(|remarks| !remarks.is_empty())
        .unwrap_or_else(|| format!("{}:{}", address, port));

    Some(ProfileItem {
        index_id: uuid::Uuid::new_v4().to_string(),
        sub_id: sub_id.to_string(),
        address,
        port,
        remarks,
        raw: line.as_str().to_string(),
    })
}

fn in_scope(profile: &ProfileItem, scope: &str) -> bool {
    scope.is_empty() || profile.sub_id == scope
}

#[async_trait]
impl ProfileStore for YamlProfileStore {
    async fn add_batch(&self, lines: &[ConfigLine], sub_id: &str) -> Result<usize> {
        let mut db = self.db.lock().await;
        let mut added = 0;

        for line in lines {
            let duplicate = db
                .profiles
                .iter()
                .any(|p| p.sub_id == sub_id && p.raw.eq_ignore_ascii_case(line.as_str()));
            if duplicate {
                tracing::debug!("Skipping duplicate profile: {}", line);
                continue;
            }

            match parse_profile(line, sub_id) {
                Some(profile) => {
                    db.profiles.push(profile);
                    added += 1;
                }
                None => tracing::debug!("Skipping unsupported config line: {}", line),
            }
        }

        if added > 0 {
            self.save(&db).await?;
        }

        tracing::info!("Added {} of {} profiles", added, lines.len());
        Ok(added)
    }

    async fn list_profiles(&self, scope: &str) -> Result<Vec<ProfileItem>> {
        let db = self.db.lock().await;
        Ok(db
            .profiles
            .iter()
            .filter(|p| in_scope(p, scope))
            .cloned()
            .collect())
    }

    async fn list_latency_results(&self) -> Result<Vec<LatencyResult>> {
        let db = self.db.lock().await;
        Ok(db
            .latencies
            .iter()
            .map(|(id, delay)| LatencyResult::new(id.clone(), *delay))
            .collect())
    }

    async fn remove_invalid(&self, scope: &str) -> Result<usize> {
        let mut db = self.db.lock().await;
        let ProfileDatabase {
            active_id,
            profiles,
            latencies,
        } = &mut *db;

        let before = profiles.len();
        profiles.retain(|p| {
            let valid = latencies.get(&p.index_id).is_some_and(|delay| *delay > 0);
            valid || !in_scope(p, scope)
        });
        let removed = before - profiles.len();

        if removed > 0 {
            latencies.retain(|id, _| profiles.iter().any(|p| &p.index_id == id));
            if active_id
                .as_ref()
                .is_some_and(|id| !profiles.iter().any(|p| &p.index_id == id))
            {
                *active_id = None;
            }
            self.save(&db).await?;
        }

        Ok(removed)
    }

    async fn set_active(&self, index_id: &str) -> Result<()> {
        let mut db = self.db.lock().await;
        if !db.profiles.iter().any(|p| p.index_id == index_id) {
            return Err(StoreError::ProfileNotFound(index_id.to_string()).into());
        }

        db.active_id = Some(index_id.to_string());
        self.save(&db).await
    }

    async fn active_profile_id(&self) -> Result<Option<String>> {
        Ok(self.db.lock().await.active_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lines(raw: &[&str]) -> Vec<ConfigLine> {
        raw.iter().filter_map(|l| ConfigLine::parse(l)).collect()
    }

    async fn open_store(temp_dir: &TempDir) -> YamlProfileStore {
        let path = Utf8PathBuf::try_from(temp_dir.path().join("profiles.yaml")).unwrap();
        YamlProfileStore::open(path).await.unwrap()
    }

    #[test]
    fn test_parse_profile() {
        let line = ConfigLine::parse("trojan://secret@node.example.com:8443#Tokyo%201").unwrap();
        let profile = parse_profile(&line, "sub").unwrap();

        assert_eq!(profile.address, "node.example.com");
        assert_eq!(profile.port, 8443);
        assert_eq!(profile.remarks, "Tokyo 1");
        assert_eq!(profile.sub_id, "sub");
        assert_eq!(profile.raw, line.as_str());
    }

    #[test]
    fn test_parse_profile_keeps_reserved_characters_in_remarks() {
        let line = ConfigLine::parse("trojan://p@a.example.com:443#A&B+C%20D").unwrap();
        let profile = parse_profile(&line, "").unwrap();
        assert_eq!(profile.remarks, "A&B+C D");

        let line = ConfigLine::parse("trojan://p@a.example.com:443").unwrap();
        assert_eq!(parse_profile(&line, "").unwrap().remarks, "a.example.com:443");
    }

    #[test]
    fn test_parse_profile_ipv6_host_without_brackets() {
        let line = ConfigLine::parse("trojan://p@[::1]:8443#v6").unwrap();
        let profile = parse_profile(&line, "").unwrap();

        assert_eq!(profile.address, "::1");
        assert_eq!(profile.port, 8443);
        assert_eq!(profile.remarks, "v6");
    }

    #[test]
    fn test_parse_profile_rejects_opaque_lines() {
        let line = ConfigLine::parse("vmess://eyJhZGQiOiIxLjIuMy40In0=").unwrap();
        assert!(parse_profile(&line, "").is_none());
    }

    #[tokio::test]
    async fn test_add_batch_counts_only_added() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let batch = lines(&["vless://id@a.example.com:443", "not a url", "ss://x@b.example.com:8388"]);
        assert_eq!(store.add_batch(&batch, "sub").await.unwrap(), 2);

        // Same lines again are duplicates
        assert_eq!(store.add_batch(&batch, "sub").await.unwrap(), 0);
        assert_eq!(store.list_profiles("sub").await.unwrap().len(), 2);
        assert!(store.list_profiles("other").await.unwrap().is_empty());
        assert_eq!(store.list_profiles("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_invalid_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let batch = lines(&[
            "trojan://p@a.example.com:1",
            "trojan://p@b.example.com:2",
            "trojan://p@c.example.com:3",
        ]);
        store.add_batch(&batch, "").await.unwrap();
        let profiles = store.list_profiles("").await.unwrap();

        store.record_latency(&profiles[0].index_id, 120).await.unwrap();
        store.record_latency(&profiles[1].index_id, -1).await.unwrap();

        // b failed, c was never tested
        assert_eq!(store.remove_invalid("").await.unwrap(), 2);

        let reopened = open_store(&temp_dir).await;
        let remaining = reopened.list_profiles("").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].index_id, profiles[0].index_id);
        assert_eq!(reopened.list_latency_results().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_invalid_respects_scope() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store
            .add_batch(&lines(&["trojan://p@a.example.com:1"]), "one")
            .await
            .unwrap();
        store
            .add_batch(&lines(&["trojan://p@b.example.com:2"]), "two")
            .await
            .unwrap();

        assert_eq!(store.remove_invalid("one").await.unwrap(), 1);
        assert_eq!(store.list_profiles("two").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_active() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;
        store
            .add_batch(&lines(&["trojan://p@a.example.com:1"]), "")
            .await
            .unwrap();
        let id = store.list_profiles("").await.unwrap()[0].index_id.clone();

        assert!(store.set_active("missing").await.is_err());
        assert_eq!(store.active_profile_id().await.unwrap(), None);

        store.set_active(&id).await.unwrap();
        assert_eq!(store.active_profile_id().await.unwrap(), Some(id));
    }
}
