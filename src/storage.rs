use crate::config::NotionConfig;
use crate::models::TimeEntry;
use crate::sync::PagePatch;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

pub const ENTRIES_KEY: &str = "lifestream_entries";
pub const NOTION_CONFIG_KEY: &str = "lifestream_notion_config";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value storage: one JSON file per key inside the data directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Returns `None` when the key is missing or its blob cannot be decoded.
    /// Undecodable blobs are moved aside so the next write does not destroy them.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        match serde_json::from_str::<T>(&content) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                let backup = path.with_extension("json.corrupt");
                error!(key, error = %err, backup = ?backup, "failed to decode stored blob");
                fs::rename(&path, &backup).map_err(|source| StorageError::Io {
                    path: backup.clone(),
                    source,
                })?;
                Ok(None)
            }
        }
    }

    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let encoded = serde_json::to_string(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

/// The authoritative list of time entries, in insertion order.
///
/// Every mutation is written through to the `lifestream_entries` blob.
#[derive(Debug)]
pub struct EntryStore {
    blobs: BlobStore,
    entries: Vec<TimeEntry>,
}

impl EntryStore {
    /// Loads the stored entries, or starts empty when nothing was stored yet.
    pub fn load(data_dir: &Path) -> Result<Self, StorageError> {
        let blobs = BlobStore::new(data_dir);
        let entries: Vec<TimeEntry> = blobs.read(ENTRIES_KEY)?.unwrap_or_default();
        debug!(count = entries.len(), dir = ?data_dir, "loaded entries");
        Ok(Self { blobs, entries })
    }

    pub fn entries(&self) -> &[TimeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TimeEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Resolves a full id or an unambiguous id prefix.
    pub fn resolve_id(&self, prefix: &str) -> Option<&str> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return None;
        }
        if let Some(entry) = self.get(prefix) {
            return Some(entry.id.as_str());
        }
        let mut matches = self.entries.iter().filter(|entry| entry.id.starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.id.as_str())
    }

    pub fn unsynced(&self) -> impl Iterator<Item = &TimeEntry> {
        self.entries.iter().filter(|entry| !entry.is_synced())
    }

    pub fn unsynced_count(&self) -> usize {
        self.unsynced().count()
    }

    pub fn append(&mut self, batch: Vec<TimeEntry>) -> Result<usize, StorageError> {
        let added = batch.len();
        if added == 0 {
            return Ok(0);
        }
        self.entries.extend(batch);
        self.flush()?;
        info!(added, total = self.entries.len(), "appended entries");
        Ok(added)
    }

    pub fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.flush()?;
        info!(id, "deleted entry");
        Ok(true)
    }

    /// Full reset. This is the only path that drops Notion page ids.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        self.blobs.remove(ENTRIES_KEY)?;
        info!("cleared all entries");
        Ok(())
    }

    /// Attaches Notion page ids from a sync run and writes once.
    ///
    /// A patch never overwrites an existing page id, and patches for entries
    /// deleted in the meantime are skipped.
    pub fn commit_sync(&mut self, patches: &[PagePatch]) -> Result<usize, StorageError> {
        let mut applied = 0;
        for patch in patches {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|entry| entry.id == patch.entry_id)
                && entry.notion_page_id.is_none()
            {
                entry.notion_page_id = Some(patch.page_id.clone());
                applied += 1;
            }
        }
        if applied > 0 {
            self.flush()?;
        }
        debug!(applied, offered = patches.len(), "committed sync patches");
        Ok(applied)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.blobs.write(ENTRIES_KEY, &self.entries)
    }
}

pub fn load_notion_config(data_dir: &Path) -> Result<Option<NotionConfig>, StorageError> {
    BlobStore::new(data_dir).read(NOTION_CONFIG_KEY)
}

/// Stored settings with env fallbacks applied; the fallbacks are not saved.
pub fn effective_notion_config(data_dir: &Path) -> Result<NotionConfig, StorageError> {
    Ok(load_notion_config(data_dir)?
        .unwrap_or_default()
        .with_env_fallbacks())
}

pub fn save_notion_config(data_dir: &Path, config: &NotionConfig) -> Result<(), StorageError> {
    BlobStore::new(data_dir).write(NOTION_CONFIG_KEY, config)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::{Duration, TimeZone, Utc};

    pub(crate) fn temp_data_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        static COUNTER: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
        let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        dir.push(format!(
            "lifestream-test-{}-{}-{}",
            std::process::id(),
            stamp,
            seq
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    pub(crate) fn sample_entry(id: &str, task: &str) -> TimeEntry {
        let start = Utc.with_ymd_and_hms(2025, 12, 2, 9, 0, 0).unwrap();
        TimeEntry {
            id: id.to_string(),
            task: task.to_string(),
            activity: "学习".to_string(),
            category: Category::Investment,
            duration_minutes: 60,
            start_time: start,
            end_time: start + Duration::minutes(60),
            timestamp: start.timestamp_millis(),
            date_str: start.date_naive(),
            keywords: None,
            goal_id: None,
            goal_title: None,
            notion_page_id: None,
        }
    }

    #[test]
    fn load_from_empty_dir_starts_empty() {
        let dir = temp_data_dir();
        let store = EntryStore::load(&dir).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn entries_round_trip_with_unset_optionals() {
        let dir = temp_data_dir();
        let mut bare = sample_entry("a", "读书");
        bare.keywords = None;
        let mut full = sample_entry("b", "学习Rust编程");
        full.keywords = Some(vec!["学习".to_string(), "编程".to_string()]);
        full.goal_id = Some("goal-1".to_string());
        full.goal_title = Some("学习Rust编程".to_string());
        full.notion_page_id = Some("page-1".to_string());
        let mut empty_keywords = sample_entry("c", "散步");
        empty_keywords.keywords = Some(Vec::new());

        let mut store = EntryStore::load(&dir).expect("load");
        store
            .append(vec![bare.clone(), full.clone(), empty_keywords.clone()])
            .expect("append");

        let reloaded = EntryStore::load(&dir).expect("reload");
        assert_eq!(reloaded.entries(), &[bare, full, empty_keywords][..]);
    }

    #[test]
    fn unset_optionals_are_omitted_from_json() {
        let json = serde_json::to_string(&sample_entry("a", "t")).unwrap();
        assert!(!json.contains("notionPageId"));
        assert!(!json.contains("goalId"));
        assert!(!json.contains("keywords"));
        assert!(json.contains("\"durationMinutes\":60"));
        assert!(json.contains("\"dateStr\":\"2025-12-02\""));
    }

    #[test]
    fn notion_config_round_trip() {
        let dir = temp_data_dir();
        assert_eq!(load_notion_config(&dir).unwrap(), None);

        let without_proxy = NotionConfig {
            api_key: "secret_123".to_string(),
            records_database_id: "records".to_string(),
            goals_database_id: String::new(),
            proxy_url: None,
        };
        save_notion_config(&dir, &without_proxy).unwrap();
        assert_eq!(load_notion_config(&dir).unwrap(), Some(without_proxy));

        let with_proxy = NotionConfig {
            api_key: "secret_123".to_string(),
            records_database_id: "records".to_string(),
            goals_database_id: "goals".to_string(),
            proxy_url: Some("http://localhost:8080/notion/".to_string()),
        };
        save_notion_config(&dir, &with_proxy).unwrap();
        assert_eq!(load_notion_config(&dir).unwrap(), Some(with_proxy));
    }

    #[test]
    fn delete_and_clear_persist() {
        let dir = temp_data_dir();
        let mut store = EntryStore::load(&dir).unwrap();
        store
            .append(vec![sample_entry("a", "one"), sample_entry("b", "two")])
            .unwrap();

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("missing").unwrap());
        let reloaded = EntryStore::load(&dir).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.entries()[0].id, "b");

        store.clear().unwrap();
        assert!(EntryStore::load(&dir).unwrap().is_empty());
    }

    #[test]
    fn commit_sync_never_overwrites_page_ids() {
        let dir = temp_data_dir();
        let mut store = EntryStore::load(&dir).unwrap();
        let mut synced = sample_entry("a", "one");
        synced.notion_page_id = Some("page-original".to_string());
        store
            .append(vec![synced, sample_entry("b", "two")])
            .unwrap();

        let applied = store
            .commit_sync(&[
                PagePatch {
                    entry_id: "a".to_string(),
                    page_id: "page-new".to_string(),
                },
                PagePatch {
                    entry_id: "b".to_string(),
                    page_id: "page-b".to_string(),
                },
                PagePatch {
                    entry_id: "gone".to_string(),
                    page_id: "page-x".to_string(),
                },
            ])
            .unwrap();

        assert_eq!(applied, 1);
        let reloaded = EntryStore::load(&dir).unwrap();
        assert_eq!(
            reloaded.get("a").unwrap().notion_page_id.as_deref(),
            Some("page-original")
        );
        assert_eq!(
            reloaded.get("b").unwrap().notion_page_id.as_deref(),
            Some("page-b")
        );
        assert_eq!(reloaded.unsynced_count(), 0);
    }

    #[test]
    fn corrupt_blob_is_moved_aside() {
        let dir = temp_data_dir();
        let blobs = BlobStore::new(&dir);
        fs::write(blobs.path_for(ENTRIES_KEY), "{not json").unwrap();

        let store = EntryStore::load(&dir).unwrap();
        assert!(store.is_empty());
        assert!(dir.join("lifestream_entries.json.corrupt").exists());
        assert!(!blobs.path_for(ENTRIES_KEY).exists());
    }

    #[test]
    fn resolve_id_accepts_unique_prefix() {
        let dir = temp_data_dir();
        let mut store = EntryStore::load(&dir).unwrap();
        store
            .append(vec![
                sample_entry("abc-1", "one"),
                sample_entry("abd-2", "two"),
            ])
            .unwrap();
        assert_eq!(store.resolve_id("abc"), Some("abc-1"));
        assert_eq!(store.resolve_id("ab"), None);
        assert_eq!(store.resolve_id("abd-2"), Some("abd-2"));
        assert_eq!(store.resolve_id(""), None);
    }
}
