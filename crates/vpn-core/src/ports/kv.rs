use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::KvError;

/// A ban record as held in the kv store: a reason and an absolute expiry.
#[derive(Debug, Clone)]
pub struct BanRecord {
    pub reason: String,
    pub expires_at: DateTime<Utc>,
}

impl BanRecord {
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }
}

/// The ephemeral kv store backing the Protection Layer's sliding-window
/// counters and ban records. All state here carries an explicit TTL and is
/// never authoritative data — losing it fails open to "not yet banned /
/// not yet rate limited", never the reverse.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Records one hit for `key` at `now` and returns the number of hits
    /// recorded for that key within the trailing `window_secs`, including
    /// the one just recorded. Implementations evict entries older than the
    /// window lazily, on read, as a sorted sequence of timestamps.
    async fn record_hit(&self, key: &str, now: DateTime<Utc>, window_secs: i64)
        -> Result<u64, KvError>;

    /// Returns the number of hits recorded for `key` within the trailing
    /// `window_secs`, without recording a new one. Used for the
    /// observability outputs (current count / remaining / reset).
    async fn count(&self, key: &str, now: DateTime<Utc>, window_secs: i64) -> Result<u64, KvError>;

    /// Writes (or overwrites) a ban record for `ip`, expiring at
    /// `now + ttl_secs`.
    async fn set_ban(
        &self,
        ip: &str,
        reason: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<(), KvError>;

    /// Returns the live ban record for `ip`, if any (already expired
    /// records are treated as absent).
    async fn get_ban(&self, ip: &str, now: DateTime<Utc>) -> Result<Option<BanRecord>, KvError>;
}
