//! In-memory kv store backing the Protection Layer: sliding-window hit
//! counters and ban records, both with TTL semantics preserved even
//! from a single-process fallback.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use vpn_core::error::KvError;
use vpn_core::ports::{BanRecord, KvStore};

#[derive(Default)]
pub struct MemoryKv {
    hits: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    bans: Mutex<HashMap<String, BanRecord>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn record_hit(&self, key: &str, now: DateTime<Utc>, window_secs: i64) -> Result<u64, KvError> {
        let mut hits = self.hits.lock().await;
        let entries = hits.entry(key.to_string()).or_default();
        entries.push_back(now);
        evict_outside_window(entries, now, window_secs);
        Ok(entries.len() as u64)
    }

    async fn count(&self, key: &str, now: DateTime<Utc>, window_secs: i64) -> Result<u64, KvError> {
        let mut hits = self.hits.lock().await;
        let Some(entries) = hits.get_mut(key) else {
            return Ok(0);
        };
        evict_outside_window(entries, now, window_secs);
        Ok(entries.len() as u64)
    }

    async fn set_ban(&self, ip: &str, reason: &str, ttl_secs: i64, now: DateTime<Utc>) -> Result<(), KvError> {
        self.bans.lock().await.insert(
            ip.to_string(),
            BanRecord { reason: reason.to_string(), expires_at: now + chrono::Duration::seconds(ttl_secs) },
        );
        Ok(())
    }

    async fn get_ban(&self, ip: &str, now: DateTime<Utc>) -> Result<Option<BanRecord>, KvError> {
        let mut bans = self.bans.lock().await;
        match bans.get(ip) {
            Some(ban) if ban.expires_at > now => Ok(Some(ban.clone())),
            Some(_) => {
                bans.remove(ip);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

fn evict_outside_window(entries: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window_secs: i64) {
    let cutoff = now - chrono::Duration::seconds(window_secs);
    while matches!(entries.front(), Some(ts) if *ts <= cutoff) {
        entries.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_within_window_only() {
        let kv = MemoryKv::new();
        let t0 = Utc::now();
        kv.record_hit("k", t0, 60).await.unwrap();
        kv.record_hit("k", t0 + chrono::Duration::seconds(10), 60).await.unwrap();
        let count = kv.count("k", t0 + chrono::Duration::seconds(30), 60).await.unwrap();
        assert_eq!(count, 2);

        let count_after_window = kv.count("k", t0 + chrono::Duration::seconds(120), 60).await.unwrap();
        assert_eq!(count_after_window, 0);
    }

    #[tokio::test]
    async fn ban_expires_after_ttl() {
        let kv = MemoryKv::new();
        let t0 = Utc::now();
        kv.set_ban("1.2.3.4", "test", 60, t0).await.unwrap();
        assert!(kv.get_ban("1.2.3.4", t0 + chrono::Duration::seconds(30)).await.unwrap().is_some());
        assert!(kv.get_ban("1.2.3.4", t0 + chrono::Duration::seconds(90)).await.unwrap().is_none());
    }
}
