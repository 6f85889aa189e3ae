//! Flat-file memory tools served when the component bundle is disabled.
//!
//! Each memory is written to `<data_dir>/<id>.json`. Queries rescan the directory on every
//! call; nothing is cached in memory.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use walkdir::WalkDir;

use super::memory::{AddMemoryArgs, QueryMemoryArgs};
use super::{ToolCapability, ToolError, ToolProvider};
use crate::engine::{MemoryRecord, StoreError, now_timestamp};

/// `add_memory` and `query_memory` over one JSON file per memory.
pub struct FileMemoryTools {
    data_dir: PathBuf,
}

impl FileMemoryTools {
    /// Serve memories stored directly under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn add_memory(&self, args: AddMemoryArgs) -> Result<String, ToolError> {
        if args.content.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "`content` must not be empty".into(),
            ));
        }
        fs::create_dir_all(&self.data_dir).map_err(|err| StoreError::io(&self.data_dir, err))?;

        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            content: args.content,
            timestamp: now_timestamp()?,
            importance: args.importance,
            keywords: Vec::new(),
            tags: Vec::new(),
        };
        let path = self.data_dir.join(format!("{}.json", record.id));
        let encoded = serde_json::to_vec(&record).map_err(StoreError::from)?;
        fs::write(&path, encoded).map_err(|err| StoreError::io(&path, err))?;
        tracing::info!(id = %record.id, path = %path.display(), "Memory file written");
        Ok(record.id)
    }

    fn query_memory(&self, args: QueryMemoryArgs) -> Vec<MemoryRecord> {
        let needle = args.query.to_lowercase();
        let mut hits: Vec<MemoryRecord> = self
            .records()
            .into_iter()
            .filter(|record| record.content.to_lowercase().contains(&needle))
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits.truncate(args.limit);
        hits
    }

    // Unreadable or malformed files are skipped.
    fn records(&self) -> Vec<MemoryRecord> {
        WalkDir::new(&self.data_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| {
                let raw = fs::read(entry.path()).ok()?;
                let value: serde_json::Value = serde_json::from_slice(&raw).ok()?;
                Some(MemoryRecord::normalize(&value))
            })
            .collect()
    }
}

impl ToolProvider for FileMemoryTools {
    fn provider_name(&self) -> &'static str {
        "fallback"
    }

    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
        let add = self.clone();
        let query = self;
        vec![
            ToolCapability::new(
                "add_memory",
                "Write a memory to a JSON file in the data directory and return its id.",
                move |args: AddMemoryArgs| {
                    let tools = add.clone();
                    async move { tools.add_memory(args) }
                },
            ),
            ToolCapability::new(
                "query_memory",
                "Search memory files whose content contains the query text.",
                move |args: QueryMemoryArgs| {
                    let tools = query.clone();
                    async move { Ok::<_, ToolError>(tools.query_memory(args)) }
                },
            ),
        ]
    }
}
