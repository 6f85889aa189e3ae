use std::path::Path;
use std::sync::Mutex;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::{StoreError, format_timestamp};

/// Retention tier selected when adding a short-term entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TtlTier {
    /// Uses `ttl_short`.
    #[default]
    Short,
    /// Uses `ttl_medium`.
    Medium,
    /// Uses `ttl_long`.
    Long,
}

/// A transient memory with an expiry.
#[derive(Debug, Clone, Serialize)]
pub struct ShortTermEntry {
    /// Generated identifier.
    pub id: String,
    /// Stored text.
    pub content: String,
    /// Tier the entry was added under.
    pub tier: TtlTier,
    /// Creation time.
    pub timestamp: String,
    /// Expiry time.
    pub expires_at: String,
    #[serde(skip)]
    expires: OffsetDateTime,
}

/// In-memory, TTL-bounded store. Expired entries are purged on every access.
pub struct ShortTermStore {
    ttl_short: u64,
    ttl_medium: u64,
    ttl_long: u64,
    entries: Mutex<Vec<ShortTermEntry>>,
}

impl ShortTermStore {
    /// Create a store with the three tier retentions, in seconds.
    pub fn create(
        data_dir: &Path,
        ttl_short: u64,
        ttl_medium: u64,
        ttl_long: u64,
    ) -> Result<Self, StoreError> {
        tracing::debug!(
            data_dir = %data_dir.display(),
            ttl_short,
            ttl_medium,
            ttl_long,
            "Short-term store ready"
        );
        Ok(Self {
            ttl_short,
            ttl_medium,
            ttl_long,
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Retention in seconds for a tier.
    pub fn ttl_for(&self, tier: TtlTier) -> u64 {
        match tier {
            TtlTier::Short => self.ttl_short,
            TtlTier::Medium => self.ttl_medium,
            TtlTier::Long => self.ttl_long,
        }
    }

    /// Add an entry under the given tier and return its identifier.
    pub fn add(&self, content: &str, tier: TtlTier) -> Result<String, StoreError> {
        let now = OffsetDateTime::now_utc();
        let ttl = i64::try_from(self.ttl_for(tier)).unwrap_or(i64::MAX);
        let expires = now.saturating_add(Duration::seconds(ttl));
        let entry = ShortTermEntry {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            tier,
            timestamp: format_timestamp(now)?,
            expires_at: format_timestamp(expires)?,
            expires,
        };
        let id = entry.id.clone();
        let mut entries = self.guard();
        purge_expired(&mut entries, now);
        entries.push(entry);
        Ok(id)
    }

    /// Live entries, newest first, at most `limit`.
    pub fn recent(&self, limit: usize) -> Vec<ShortTermEntry> {
        let mut entries = self.guard();
        purge_expired(&mut entries, OffsetDateTime::now_utc());
        entries.iter().rev().take(limit).cloned().collect()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<ShortTermEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn purge_expired(entries: &mut Vec<ShortTermEntry>, now: OffsetDateTime) {
    entries.retain(|entry| entry.expires > now);
}
