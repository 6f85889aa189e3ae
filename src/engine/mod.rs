//! Memory collaborators consumed by the adapter.
//!
//! These are deliberately small: a file-backed block store, a TTL-bounded short-term store,
//! a bounded cache in front of the block store, a template-driven prompt composer, and a
//! temporal reasoner with a fixed vocabulary. Each synchronizes its own state internally, so
//! handles can be shared across concurrently running tool invocations.

mod block_store;
mod cache;
mod prompt;
mod record;
mod short_term;
mod temporal;

pub use block_store::BlockStore;
pub use cache::CacheLayer;
pub use prompt::{DEFAULT_TEMPLATE, PromptComposer};
pub use record::{MemoryRecord, TIMESTAMP_FORMAT, format_timestamp, now_timestamp, parse_timestamp};
pub use short_term::{ShortTermEntry, ShortTermStore, TtlTier};
pub use temporal::{TemporalReasoner, TemporalSearch, TimeWindow};

use thiserror::Error;

/// Errors raised by the memory collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A record could not be serialized.
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    /// A timestamp could not be rendered.
    #[error("Failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    /// Importance outside the closed unit interval.
    #[error("importance must be between 0.0 and 1.0, got {0}")]
    InvalidImportance(f64),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
