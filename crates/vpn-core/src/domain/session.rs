use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connected,
    Disconnected,
}

/// A single open instance of a subscriber tunnelling through one server.
/// Invariant: a subscriber has at most one session in state `Connected`;
/// once disconnected the row is immutable except for administrative
/// correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    /// Nullable after server decommission.
    pub server_id: Option<Uuid>,
    pub client_address: IpAddr,
    pub client_public_key: String,
    pub status: SessionStatus,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when the Session Manager's reconcile task force-disconnects a
    /// stale session rather than the client reporting a normal disconnect.
    pub ended_by_timeout: bool,
}

impl Session {
    pub fn open(
        id: Uuid,
        subscriber_id: Uuid,
        server_id: Uuid,
        client_address: IpAddr,
        client_public_key: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subscriber_id,
            server_id: Some(server_id),
            client_address,
            client_public_key,
            status: SessionStatus::Connected,
            bytes_sent: 0,
            bytes_received: 0,
            started_at,
            ended_at: None,
            ended_by_timeout: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_received)
    }

    /// Duration in seconds, zero-floored: `ended_at` (or `now` if still
    /// connected) minus `started_at`.
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).num_seconds().max(0)
    }

    /// Average throughput in Mbit/s: total_bytes * 8 / duration / 1e3.
    /// Returns `None` for a zero-duration session to avoid a division by
    /// zero (a session disconnected in under a second has no well-defined
    /// rate).
    pub fn throughput_mbps(&self, now: DateTime<Utc>) -> Option<f64> {
        let duration = self.duration_seconds(now);
        if duration <= 0 {
            return None;
        }
        Some((self.total_bytes() as f64 * 8.0) / duration as f64 / 1_000.0)
    }
}
