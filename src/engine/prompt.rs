use std::sync::{Arc, RwLock};

use super::{CacheLayer, ShortTermStore};

/// Template used until `set_template` is called.
pub const DEFAULT_TEMPLATE: &str = "Relevant long-term memories:\n{memories}\n\nRecent context:\n{short_term}\n\nUser input: {input}";

const SHORT_TERM_WINDOW: usize = 5;

/// Assembles cached blocks and live short-term entries into a prompt.
///
/// Placeholders: `{memories}`, `{short_term}`, `{input}`.
pub struct PromptComposer {
    cache: Arc<CacheLayer>,
    short_term: Arc<ShortTermStore>,
    template: RwLock<String>,
}

impl PromptComposer {
    /// Create a composer reading from `cache` and `short_term`.
    pub fn create(cache: Arc<CacheLayer>, short_term: Arc<ShortTermStore>) -> Self {
        Self {
            cache,
            short_term,
            template: RwLock::new(DEFAULT_TEMPLATE.to_string()),
        }
    }

    /// Replace the active template.
    pub fn set_template(&self, template: impl Into<String>) {
        let mut guard = self
            .template
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = template.into();
    }

    /// Active template.
    pub fn template(&self) -> String {
        self.template
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Refresh the cache for `input` and render the template.
    pub fn compose(&self, input: &str) -> String {
        self.cache.update(input, self.cache.capacity());
        let memories = bullet_list(self.cache.cached().into_iter().map(|record| record.content));
        let short_term = bullet_list(
            self.short_term
                .recent(SHORT_TERM_WINDOW)
                .into_iter()
                .map(|entry| entry.content),
        );
        self.template()
            .replace("{memories}", &memories)
            .replace("{short_term}", &short_term)
            .replace("{input}", input)
    }

    /// Cache layer this composer reads from.
    pub fn cache_layer(&self) -> &Arc<CacheLayer> {
        &self.cache
    }

    /// Short-term store this composer reads from.
    pub fn short_term_store(&self) -> &Arc<ShortTermStore> {
        &self.short_term
    }
}

fn bullet_list(items: impl Iterator<Item = String>) -> String {
    let lines: Vec<String> = items.map(|item| format!("- {item}")).collect();
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}
