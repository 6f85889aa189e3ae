//! Lazy construction of the memory component bundle.
//!
//! The adapter owns exactly one [`AdapterState`]. The first caller to reach an `Unbuilt`
//! adapter moves it to `Building` and constructs the five components outside the lock;
//! concurrent callers wait on a condition variable until the state settles. A failed build is
//! cached and returned to every later caller until [`Adapter::reset`] is invoked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use thiserror::Error;

use crate::config::{AdapterConfig, ConfigError};
use crate::engine::{
    BlockStore, CacheLayer, PromptComposer, ShortTermStore, StoreError, TemporalReasoner,
};

/// Errors raised while building the component bundle. Cloneable so a failure can be cached.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The data directory could not be created.
    #[error("Failed to create data directory {path}: {reason}")]
    DataDirectory {
        /// Directory we attempted to create.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
    /// An adapter option had the wrong type.
    #[error("Invalid adapter option: {0}")]
    InvalidOption(String),
    /// A collaborator failed to construct.
    #[error("Failed to construct {component}: {reason}")]
    Component {
        /// Component being constructed.
        component: &'static str,
        /// Underlying failure.
        reason: String,
    },
}

impl From<ConfigError> for AdapterError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidOption(err.to_string())
    }
}

impl AdapterError {
    fn component(component: &'static str, err: StoreError) -> Self {
        Self::Component {
            component,
            reason: err.to_string(),
        }
    }
}

/// The five collaborators, built together in dependency order.
pub struct ComponentBundle {
    block_store: Arc<BlockStore>,
    short_term_store: Arc<ShortTermStore>,
    cache_layer: Arc<CacheLayer>,
    prompt_composer: Arc<PromptComposer>,
    temporal_reasoner: Arc<TemporalReasoner>,
}

impl ComponentBundle {
    fn build(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let data_dir = config.data_dir();
        if !data_dir.is_dir() {
            std::fs::create_dir_all(data_dir).map_err(|err| AdapterError::DataDirectory {
                path: data_dir.display().to_string(),
                reason: err.to_string(),
            })?;
            tracing::info!(data_dir = %data_dir.display(), "Created data directory");
        }

        let block_store = Arc::new(
            BlockStore::create(data_dir, config.embedding_model()?)
                .map_err(|err| AdapterError::component("block store", err))?,
        );
        let short_term_store = Arc::new(
            ShortTermStore::create(
                data_dir,
                config.ttl_short()?,
                config.ttl_medium()?,
                config.ttl_long()?,
            )
            .map_err(|err| AdapterError::component("short-term store", err))?,
        );
        let cache_layer = Arc::new(CacheLayer::create(
            block_store.clone(),
            config.cache_capacity()?,
        ));
        let prompt_composer = Arc::new(PromptComposer::create(
            cache_layer.clone(),
            short_term_store.clone(),
        ));
        if let Some(template) = config.prompt_template()? {
            prompt_composer.set_template(template);
        }
        let temporal_reasoner = Arc::new(TemporalReasoner::create(
            block_store.clone(),
            config.default_language()?,
        ));

        Ok(Self {
            block_store,
            short_term_store,
            cache_layer,
            prompt_composer,
            temporal_reasoner,
        })
    }

    /// Persistent long-term store.
    pub fn block_store(&self) -> &Arc<BlockStore> {
        &self.block_store
    }

    /// TTL-bounded transient store.
    pub fn short_term_store(&self) -> &Arc<ShortTermStore> {
        &self.short_term_store
    }

    /// Cache in front of the block store.
    pub fn cache_layer(&self) -> &Arc<CacheLayer> {
        &self.cache_layer
    }

    /// Prompt composer reading the cache and the short-term store.
    pub fn prompt_composer(&self) -> &Arc<PromptComposer> {
        &self.prompt_composer
    }

    /// Temporal reasoner over the block store.
    pub fn temporal_reasoner(&self) -> &Arc<TemporalReasoner> {
        &self.temporal_reasoner
    }
}

/// Lifecycle of the adapter's bundle.
#[derive(Clone)]
pub enum AdapterState {
    /// Nothing built yet.
    Unbuilt,
    /// A single writer is constructing the bundle.
    Building,
    /// Bundle available.
    Ready(Arc<ComponentBundle>),
    /// Construction failed; terminal until reset.
    Failed(AdapterError),
}

impl AdapterState {
    /// Lowercase label for status reporting.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unbuilt => "unbuilt",
            Self::Building => "building",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Owns the component bundle and builds it on first access.
pub struct Adapter {
    config: AdapterConfig,
    state: Mutex<AdapterState>,
    settled: Condvar,
    builds: AtomicUsize,
}

impl Adapter {
    /// Create an adapter; nothing is built until first access.
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AdapterState::Unbuilt),
            settled: Condvar::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Configuration the bundle is built from.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Build the bundle if needed and return it. Idempotent.
    pub fn initialize(&self) -> Result<Arc<ComponentBundle>, AdapterError> {
        let mut state = self.lock_state();
        loop {
            match &*state {
                AdapterState::Ready(bundle) => return Ok(bundle.clone()),
                AdapterState::Failed(err) => return Err(err.clone()),
                AdapterState::Building => {
                    state = self
                        .settled
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                AdapterState::Unbuilt => break,
            }
        }
        *state = AdapterState::Building;
        drop(state);

        let mut guard = BuildGuard {
            adapter: self,
            armed: true,
        };
        self.builds.fetch_add(1, Ordering::SeqCst);
        tracing::info!(data_dir = %self.config.data_dir().display(), "Building memory components");
        let outcome = ComponentBundle::build(&self.config).map(Arc::new);
        guard.armed = false;

        match &outcome {
            Ok(bundle) => {
                tracing::info!("Memory components ready");
                self.settle(AdapterState::Ready(bundle.clone()));
            }
            Err(error) => {
                tracing::error!(%error, "Memory component construction failed");
                self.settle(AdapterState::Failed(error.clone()));
            }
        }
        outcome
    }

    /// Move a failed adapter back to `Unbuilt` so the next access retries.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if matches!(*state, AdapterState::Failed(_)) {
            tracing::info!("Resetting failed adapter");
            *state = AdapterState::Unbuilt;
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AdapterState {
        self.lock_state().clone()
    }

    /// Number of construction attempts so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Block store, building the bundle on first access.
    pub fn block_store(&self) -> Result<Arc<BlockStore>, AdapterError> {
        Ok(self.initialize()?.block_store.clone())
    }

    /// Short-term store, building the bundle on first access.
    pub fn short_term_store(&self) -> Result<Arc<ShortTermStore>, AdapterError> {
        Ok(self.initialize()?.short_term_store.clone())
    }

    /// Cache layer, building the bundle on first access.
    pub fn cache_layer(&self) -> Result<Arc<CacheLayer>, AdapterError> {
        Ok(self.initialize()?.cache_layer.clone())
    }

    /// Prompt composer, building the bundle on first access.
    pub fn prompt_composer(&self) -> Result<Arc<PromptComposer>, AdapterError> {
        Ok(self.initialize()?.prompt_composer.clone())
    }

    /// Temporal reasoner, building the bundle on first access.
    pub fn temporal_reasoner(&self) -> Result<Arc<TemporalReasoner>, AdapterError> {
        Ok(self.initialize()?.temporal_reasoner.clone())
    }

    fn settle(&self, next: AdapterState) {
        *self.lock_state() = next;
        self.settled.notify_all();
    }

    fn lock_state(&self) -> MutexGuard<'_, AdapterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Marks the adapter failed if construction unwinds, so waiters are released.
struct BuildGuard<'a> {
    adapter: &'a Adapter,
    armed: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.adapter.settle(AdapterState::Failed(AdapterError::Component {
                component: "component bundle",
                reason: "construction panicked".to_string(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Barrier;

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("data");
        let adapter = Adapter::new(AdapterConfig::new(&data_dir));
        assert_eq!(adapter.state().label(), "unbuilt");

        let first = adapter.initialize().unwrap();
        assert!(data_dir.is_dir());
        std::fs::write(data_dir.join("marker"), b"kept").unwrap();
        let listing = |dir: &std::path::Path| {
            let mut names: Vec<_> = std::fs::read_dir(dir)
                .unwrap()
                .map(|entry| entry.unwrap().file_name())
                .collect();
            names.sort();
            names
        };
        let entries_before = listing(&data_dir);
        let modified_before = std::fs::metadata(&data_dir).unwrap().modified().unwrap();

        let second = adapter.initialize().unwrap();

        assert_eq!(listing(&data_dir), entries_before);
        assert_eq!(
            std::fs::metadata(&data_dir).unwrap().modified().unwrap(),
            modified_before
        );
        assert_eq!(std::fs::read(data_dir.join("marker")).unwrap(), b"kept");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(first.block_store(), second.block_store()));
        assert!(Arc::ptr_eq(
            first.temporal_reasoner(),
            second.temporal_reasoner()
        ));
        assert_eq!(adapter.build_count(), 1);
        assert_eq!(adapter.state().label(), "ready");
    }

    #[test]
    fn bundle_members_share_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Adapter::new(AdapterConfig::new(dir.path()));
        let bundle = adapter.initialize().unwrap();

        assert!(Arc::ptr_eq(
            bundle.cache_layer().block_store(),
            bundle.block_store()
        ));
        assert!(Arc::ptr_eq(
            bundle.prompt_composer().cache_layer(),
            bundle.cache_layer()
        ));
        assert!(Arc::ptr_eq(
            bundle.prompt_composer().short_term_store(),
            bundle.short_term_store()
        ));
        assert!(Arc::ptr_eq(
            bundle.temporal_reasoner().block_store(),
            bundle.block_store()
        ));
    }

    #[test]
    fn accessors_trigger_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Adapter::new(AdapterConfig::new(dir.path()));
        let store = adapter.block_store().unwrap();
        let cache = adapter.cache_layer().unwrap();
        assert!(Arc::ptr_eq(cache.block_store(), &store));
        assert_eq!(adapter.build_count(), 1);
    }

    #[test]
    fn options_reach_components() {
        let dir = tempfile::tempdir().unwrap();
        let options = json!({
            "cache_capacity": 2,
            "prompt_template": "{input}!",
            "default_language": "ko",
            "embedding_model": "mini"
        });
        let config =
            AdapterConfig::with_options(dir.path(), options.as_object().unwrap().clone());
        let adapter = Adapter::new(config);

        assert_eq!(adapter.cache_layer().unwrap().capacity(), 2);
        assert_eq!(adapter.prompt_composer().unwrap().template(), "{input}!");
        assert_eq!(
            adapter.temporal_reasoner().unwrap().default_language(),
            "ko"
        );
        assert_eq!(
            adapter.block_store().unwrap().embedding_model(),
            Some("mini")
        );
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(Adapter::new(AdapterConfig::new(dir.path())));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let adapter = adapter.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    adapter.initialize().unwrap()
                })
            })
            .collect();
        let bundles: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(adapter.build_count(), 1);
        assert!(bundles.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn failure_is_cached_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"file, not a directory").unwrap();
        let adapter = Adapter::new(AdapterConfig::new(&blocker));

        let first = adapter.initialize().err().unwrap();
        assert!(matches!(first, AdapterError::DataDirectory { .. }));
        assert_eq!(adapter.state().label(), "failed");

        let second = adapter.block_store().err().unwrap();
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(adapter.build_count(), 1);

        adapter.reset();
        assert_eq!(adapter.state().label(), "unbuilt");
        assert!(adapter.initialize().is_err());
        assert_eq!(adapter.build_count(), 2);
    }

    #[test]
    fn invalid_option_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let options = json!({ "cache_capacity": "lots" });
        let adapter = Adapter::new(AdapterConfig::with_options(
            dir.path(),
            options.as_object().unwrap().clone(),
        ));

        let err = adapter.initialize().err().unwrap();
        assert!(matches!(err, AdapterError::InvalidOption(ref message) if message.contains("cache_capacity")));
    }
}
