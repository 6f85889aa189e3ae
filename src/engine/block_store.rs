use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use walkdir::WalkDir;

use super::{MemoryRecord, StoreError, now_timestamp};

const BLOCKS_DIR: &str = "blocks";

/// Persistent long-term memory: one JSON file per block under `<data_dir>/blocks`.
///
/// Records are loaded once at construction and mirrored in memory; writes go to disk first and
/// are then appended under the store's own lock.
pub struct BlockStore {
    root: PathBuf,
    embedding_model: Option<String>,
    blocks: RwLock<Vec<MemoryRecord>>,
}

impl BlockStore {
    /// Open (or create) the store rooted in `data_dir`.
    pub fn create(data_dir: &Path, embedding_model: Option<String>) -> Result<Self, StoreError> {
        let root = data_dir.join(BLOCKS_DIR);
        fs::create_dir_all(&root).map_err(|err| StoreError::io(&root, err))?;
        let blocks = load_records(&root);
        tracing::debug!(
            root = %root.display(),
            blocks = blocks.len(),
            embedding_model = ?embedding_model,
            "Block store opened"
        );
        Ok(Self {
            root,
            embedding_model,
            blocks: RwLock::new(blocks),
        })
    }

    /// Persist a new block and return its identifier.
    pub fn add(&self, content: &str, importance: f64) -> Result<String, StoreError> {
        if !(0.0..=1.0).contains(&importance) {
            return Err(StoreError::InvalidImportance(importance));
        }
        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            timestamp: now_timestamp()?,
            importance,
            keywords: Vec::new(),
            tags: Vec::new(),
        };
        let path = self.root.join(format!("{}.json", record.id));
        let encoded = serde_json::to_vec_pretty(&record)?;
        fs::write(&path, encoded).map_err(|err| StoreError::io(&path, err))?;

        let id = record.id.clone();
        self.write_guard().push(record);
        tracing::debug!(id = %id, importance, "Block added");
        Ok(id)
    }

    /// Case-insensitive substring search, newest first, at most `limit` records.
    pub fn search(&self, query: &str, limit: usize) -> Vec<MemoryRecord> {
        let needle = query.to_lowercase();
        self.read_guard()
            .iter()
            .rev()
            .filter(|record| record.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Look up a block by identifier.
    pub fn get(&self, id: &str) -> Option<MemoryRecord> {
        self.read_guard()
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    /// Every stored block, oldest first.
    pub fn all(&self) -> Vec<MemoryRecord> {
        self.read_guard().clone()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    /// Whether the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding model configured for this store, if any.
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, Vec<MemoryRecord>> {
        self.blocks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Vec<MemoryRecord>> {
        self.blocks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_records(root: &Path) -> Vec<MemoryRecord> {
    let mut records: Vec<MemoryRecord> = WalkDir::new(root)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|entry| match read_record(entry.path()) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(path = %entry.path().display(), %error, "Skipping unreadable block");
                None
            }
        })
        .collect();
    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    records
}

fn read_record(path: &Path) -> Result<MemoryRecord, StoreError> {
    let raw = fs::read(path).map_err(|err| StoreError::io(path, err))?;
    let value: Value = serde_json::from_slice(&raw)?;
    Ok(MemoryRecord::normalize(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_search_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path(), None).unwrap();
        let id = store.add("Hello World", 0.7).unwrap();
        store.add("unrelated", 0.1).unwrap();

        let hits = store.search("hello", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].importance, 0.7);
    }

    #[test]
    fn search_returns_newest_first_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path(), None).unwrap();
        store.add("note one", 0.5).unwrap();
        let second = store.add("note two", 0.5).unwrap();
        let third = store.add("note three", 0.5).unwrap();

        let hits = store.search("note", 2);
        let ids: Vec<_> = hits.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec![third.as_str(), second.as_str()]);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = BlockStore::create(dir.path(), Some("mini".into())).unwrap();
            store.add("persisted", 0.9).unwrap()
        };
        let reopened = BlockStore::create(dir.path(), None).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&id).unwrap().content, "persisted");
    }

    #[test]
    fn loosely_shaped_files_are_normalized_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(BLOCKS_DIR);
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("legacy.json"),
            r#"{"id": "legacy", "context": "imported text"}"#,
        )
        .unwrap();
        fs::write(root.join("broken.json"), "{not json").unwrap();

        let store = BlockStore::create(dir.path(), None).unwrap();
        assert_eq!(store.len(), 1);
        let record = store.get("legacy").unwrap();
        assert_eq!(record.content, "imported text");
        assert_eq!(record.importance, 0.5);
    }

    #[test]
    fn importance_outside_unit_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::create(dir.path(), None).unwrap();
        let err = store.add("x", 1.5).unwrap_err();
        assert!(matches!(err, StoreError::InvalidImportance(value) if value == 1.5));
        assert!(store.is_empty());
    }
}
