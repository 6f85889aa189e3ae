//! Long-term memory tools backed by the block store and cache layer.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolCapability, ToolError, ToolProvider};
use crate::engine::{BlockStore, CacheLayer, MemoryRecord};

pub(crate) fn default_importance() -> f64 {
    0.5
}

pub(crate) fn default_limit() -> usize {
    5
}

/// Arguments accepted by `add_memory`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddMemoryArgs {
    /// The content of the memory to store.
    pub content: String,
    /// Importance of the memory, between 0.0 and 1.0.
    #[serde(default = "default_importance")]
    #[schemars(range(min = 0.0, max = 1.0))]
    pub importance: f64,
}

/// Arguments accepted by `query_memory`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryMemoryArgs {
    /// Text to look for inside stored memories.
    pub query: String,
    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    #[schemars(range(min = 1))]
    pub limit: usize,
}

/// Arguments accepted by `retrieve_memory`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RetrieveMemoryArgs {
    /// Identifier returned by `add_memory`.
    pub memory_id: String,
}

/// Arguments accepted by `update_cache`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateCacheArgs {
    /// Text used to select blocks for the cache.
    pub query: String,
    /// Maximum number of blocks pulled in; defaults to the cache capacity.
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub limit: Option<usize>,
}

/// Tools for storing and retrieving long-term memories.
pub struct MemoryTools {
    block_store: Arc<BlockStore>,
    cache: Arc<CacheLayer>,
}

impl MemoryTools {
    /// Bind the tools to the bundle's block store and cache.
    pub fn new(block_store: Arc<BlockStore>, cache: Arc<CacheLayer>) -> Self {
        Self { block_store, cache }
    }

    fn add_memory(&self, args: AddMemoryArgs) -> Result<String, ToolError> {
        if args.content.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "`content` must not be empty".into(),
            ));
        }
        let id = self.block_store.add(&args.content, args.importance)?;
        tracing::info!(id = %id, importance = args.importance, "Memory added");
        Ok(id)
    }

    fn query_memory(&self, args: QueryMemoryArgs) -> Vec<MemoryRecord> {
        let hits = self.block_store.search(&args.query, args.limit);
        tracing::debug!(query = %args.query, hits = hits.len(), "Memory query");
        hits
    }

    fn retrieve_memory(&self, args: RetrieveMemoryArgs) -> Result<MemoryRecord, ToolError> {
        self.block_store
            .get(&args.memory_id)
            .ok_or_else(|| ToolError::Execution(format!("memory not found: {}", args.memory_id)))
    }

    fn update_cache(&self, args: UpdateCacheArgs) -> Value {
        let limit = args.limit.unwrap_or_else(|| self.cache.capacity());
        let cached = self.cache.update(&args.query, limit);
        json!({ "cached": cached, "capacity": self.cache.capacity() })
    }
}

impl ToolProvider for MemoryTools {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
        let add = self.clone();
        let query = self.clone();
        let retrieve = self.clone();
        let cache = self;
        vec![
            ToolCapability::new(
                "add_memory",
                "Add a new memory to long-term storage and return its id.",
                move |args: AddMemoryArgs| {
                    let tools = add.clone();
                    async move { tools.add_memory(args) }
                },
            ),
            ToolCapability::new(
                "query_memory",
                "Search long-term memories whose content contains the query text.",
                move |args: QueryMemoryArgs| {
                    let tools = query.clone();
                    async move { Ok::<_, ToolError>(tools.query_memory(args)) }
                },
            ),
            ToolCapability::new(
                "retrieve_memory",
                "Fetch one long-term memory by id.",
                move |args: RetrieveMemoryArgs| {
                    let tools = retrieve.clone();
                    async move { tools.retrieve_memory(args) }
                },
            ),
            ToolCapability::new(
                "update_cache",
                "Pull memories matching the query into the working cache.",
                move |args: UpdateCacheArgs| {
                    let tools = cache.clone();
                    async move { Ok::<_, ToolError>(tools.update_cache(args)) }
                },
            ),
        ]
    }
}
