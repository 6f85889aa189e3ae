//! Prompt composition tool.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use super::{ToolCapability, ToolError, ToolProvider};
use crate::engine::PromptComposer;

/// Arguments accepted by `compose_prompt`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ComposePromptArgs {
    /// User input the prompt is built around.
    pub user_input: String,
}

/// Exposes the prompt composer.
pub struct PromptTools {
    composer: Arc<PromptComposer>,
}

impl PromptTools {
    /// Bind the tool to the bundle's prompt composer.
    pub fn new(composer: Arc<PromptComposer>) -> Self {
        Self { composer }
    }
}

impl ToolProvider for PromptTools {
    fn provider_name(&self) -> &'static str {
        "prompt"
    }

    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
        vec![ToolCapability::new(
            "compose_prompt",
            "Build a prompt from cached memories, recent context, and the user input.",
            move |args: ComposePromptArgs| {
                let tools = self.clone();
                async move { Ok::<_, ToolError>(tools.composer.compose(&args.user_input)) }
            },
        )]
    }
}
