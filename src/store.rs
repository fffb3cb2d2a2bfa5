use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Caption and presentation data for one image, keyed by filename in [`MetadataMap`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// Dominant color as `#rrggbb`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    // Fields written by other tools survive a load/save cycle
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImageInfo {
    pub fn has_placeholder(&self) -> bool {
        self.color.is_some() && self.blur_data_url.is_some()
    }
}

pub type MetadataMap = BTreeMap<String, ImageInfo>;

/// Caption fields the admin page edits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptionUpdate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read metadata file: {0}")]
    Read(#[source] std::io::Error),

    #[error("metadata file is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to encode metadata: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write metadata file: {0}")]
    Write(#[source] std::io::Error),

    #[error("metadata lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_write(&self) -> bool {
        matches!(self, StoreError::Encode(_) | StoreError::Write(_))
    }
}

/// JSON file holding the [`MetadataMap`].
///
/// Every operation goes to disk so hand edits are picked up; the mutex
/// serializes read-modify-write cycles within this process.
#[derive(Clone)]
pub struct MetadataStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<MetadataMap, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.read_unlocked()
    }

    /// Overwrites the whole file with `map`.
    pub fn replace(&self, map: &MetadataMap) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.write_unlocked(map)
    }

    /// Runs `f` on the current contents and persists the result.
    pub fn update<T>(&self, f: impl FnOnce(&mut MetadataMap) -> T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_unlocked()?;
        let out = f(&mut map);
        self.write_unlocked(&map)?;
        Ok(out)
    }

    /// Sets the caption fields of `filename`, keeping order and placeholders.
    pub fn upsert_caption(&self, filename: &str, caption: CaptionUpdate) -> Result<ImageInfo, StoreError> {
        self.update(|map| {
            let entry = map.entry(filename.to_string()).or_default();
            entry.title = caption.title;
            entry.description = caption.description;
            entry.date = caption.date;
            entry.clone()
        })
    }

    /// Returns the removed entry, if there was one. The file is left untouched otherwise.
    pub fn remove(&self, filename: &str) -> Result<Option<ImageInfo>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_unlocked()?;
        let removed = map.remove(filename);
        if removed.is_some() {
            self.write_unlocked(&map)?;
        }
        Ok(removed)
    }

    fn read_unlocked(&self) -> Result<MetadataMap, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MetadataMap::new()),
            Err(e) => return Err(StoreError::Read(e)),
        };
        if content.trim().is_empty() {
            return Ok(MetadataMap::new());
        }
        serde_json::from_str(&content).map_err(StoreError::Parse)
    }

    fn write_unlocked(&self, map: &MetadataMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
        }
        let json = serde_json::to_string_pretty(map).map_err(StoreError::Encode)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(StoreError::Write)?;
        std::fs::rename(&tmp, &self.path).map_err(StoreError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> MetadataStore {
        MetadataStore::new(dir.path().join("data").join("images.json"))
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Parse(_))));
    }

    #[test]
    fn caption_update_keeps_order_and_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .update(|map| {
                map.insert(
                    "cat.png".into(),
                    ImageInfo {
                        order: Some(3),
                        color: Some("#112233".into()),
                        ..ImageInfo::default()
                    },
                );
            })
            .unwrap();

        let info = store
            .upsert_caption(
                "cat.png",
                CaptionUpdate {
                    title: "Cat".into(),
                    description: "A cat".into(),
                    date: "May 2024".into(),
                },
            )
            .unwrap();

        assert_eq!(info.title, "Cat");
        assert_eq!(info.order, Some(3));
        assert_eq!(store.load().unwrap()["cat.png"].color.as_deref(), Some("#112233"));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"a.png": {"title": "A", "featuredOn": "home"}}"#,
        )
        .unwrap();

        store.upsert_caption("b.png", CaptionUpdate::default()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["a.png"]["featuredOn"], "home");
        assert_eq!(raw["a.png"]["title"], "A");
        assert!(raw["b.png"].is_object());
    }

    #[test]
    fn write_failures_are_reported_as_writes() {
        let dir = tempfile::tempdir().unwrap();
        // The data file's parent is a regular file, so the directory cannot be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = MetadataStore::new(blocker.join("images.json"));

        let err = store.replace(&MetadataMap::new()).unwrap_err();
        assert!(err.is_write(), "{}", err);
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.upsert_caption("x.jpg", CaptionUpdate::default()).unwrap();

        assert!(store.remove("x.jpg").unwrap().is_some());
        assert!(store.remove("x.jpg").unwrap().is_none());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .upsert_caption(&format!("img{}.png", i), CaptionUpdate::default())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().unwrap().len(), 8);
    }
}
