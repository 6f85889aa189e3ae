//! Time-aware search tool.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use super::{ToolCapability, ToolError, ToolProvider};
use crate::engine::TemporalReasoner;

/// Arguments accepted by `search_time`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchTimeArgs {
    /// Query that may contain a relative time reference.
    pub query: String,
    /// Language hint (`auto`, `en`, `ko`); defaults to the configured language.
    #[serde(default)]
    pub language: Option<String>,
}

/// Exposes the temporal reasoner.
pub struct TemporalTools {
    reasoner: Arc<TemporalReasoner>,
}

impl TemporalTools {
    /// Bind the tool to the bundle's temporal reasoner.
    pub fn new(reasoner: Arc<TemporalReasoner>) -> Self {
        Self { reasoner }
    }
}

impl ToolProvider for TemporalTools {
    fn provider_name(&self) -> &'static str {
        "temporal"
    }

    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
        vec![ToolCapability::new(
            "search_time",
            "Find memories from the period a relative time expression refers to.",
            move |args: SearchTimeArgs| {
                let tools = self.clone();
                async move {
                    Ok::<_, ToolError>(
                        tools
                            .reasoner
                            .search(&args.query, args.language.as_deref()),
                    )
                }
            },
        )]
    }
}
