//! Short-term memory tools.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use super::{ToolCapability, ToolError, ToolProvider};
use crate::engine::{ShortTermStore, TtlTier};

fn default_recent() -> usize {
    10
}

/// Arguments accepted by `add_short_term`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddShortTermArgs {
    /// Text to remember briefly.
    pub content: String,
    /// Retention tier: `short`, `medium`, or `long`.
    #[serde(default)]
    pub ttl: TtlTier,
}

/// Arguments accepted by `get_short_term`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetShortTermArgs {
    /// Maximum number of entries to return.
    #[serde(default = "default_recent")]
    #[schemars(range(min = 1))]
    pub limit: usize,
}

/// Tools over the TTL-bounded store.
pub struct ShortTermTools {
    store: Arc<ShortTermStore>,
}

impl ShortTermTools {
    /// Bind the tools to the bundle's short-term store.
    pub fn new(store: Arc<ShortTermStore>) -> Self {
        Self { store }
    }
}

impl ToolProvider for ShortTermTools {
    fn provider_name(&self) -> &'static str {
        "short_term"
    }

    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
        let add = self.clone();
        let recent = self;
        vec![
            ToolCapability::new(
                "add_short_term",
                "Remember text for a limited time (short, medium, or long retention).",
                move |args: AddShortTermArgs| {
                    let tools = add.clone();
                    async move {
                        if args.content.trim().is_empty() {
                            return Err(ToolError::InvalidArguments(
                                "`content` must not be empty".into(),
                            ));
                        }
                        Ok(tools.store.add(&args.content, args.ttl)?)
                    }
                },
            ),
            ToolCapability::new(
                "get_short_term",
                "List live short-term memories, newest first.",
                move |args: GetShortTermArgs| {
                    let tools = recent.clone();
                    async move { Ok::<_, ToolError>(tools.store.recent(args.limit)) }
                },
            ),
        ]
    }
}
