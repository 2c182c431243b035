//! Metrics Push: per-subscriber session telemetry channels and a
//! super-user-only aggregate channel, both fed at a configured cadence
//! on a server-side ticker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::ports::{Clock, ServerRepo, SessionRepo};
use crate::servers::ServerRegistry;

/// One tick of a subscriber's session channel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub status: &'static str,
    pub total_bytes: u64,
    pub throughput_mbps: Option<f64>,
    pub latency_ms: Option<u32>,
    pub server_load: Option<f64>,
}

/// One tick of the operator aggregate channel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregateSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_subscribers: u64,
    pub active_sessions: u64,
    pub active_servers: u64,
    pub alerts: Vec<String>,
}

/// Capacity chosen so that a consumer falling behind by more than a
/// handful of ticks is, by construction, "slow" and should see lag rather
/// than unbounded buffering.
const CHANNEL_CAPACITY: usize = 8;

/// Per-subscriber registry of the single live session channel, plus the
/// shared operator channel.
pub struct MetricsPush {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<SessionSnapshot>>>,
    operator_channel: broadcast::Sender<AggregateSnapshot>,
    sessions: Arc<dyn SessionRepo>,
    servers: Arc<dyn ServerRepo>,
    registry: Arc<ServerRegistry>,
    clock: Arc<dyn Clock>,
}

impl MetricsPush {
    pub fn new(
        sessions: Arc<dyn SessionRepo>,
        servers: Arc<dyn ServerRepo>,
        registry: Arc<ServerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (operator_channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            channels: Mutex::new(HashMap::new()),
            operator_channel,
            sessions,
            servers,
            registry,
            clock,
        }
    }

    /// Subscribes to `subscriber_id`'s session channel, forcibly closing
    /// any previously open one for the same subscriber by dropping its
    /// sender.
    #[instrument(skip(self))]
    pub fn subscribe_session(&self, subscriber_id: Uuid) -> broadcast::Receiver<SessionSnapshot> {
        let mut channels = self.channels.lock().expect("metrics channel registry lock poisoned");
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(subscriber_id, tx);
        rx
    }

    /// Authorized only for super-users by the caller; this layer just
    /// hands back the shared receiver.
    pub fn subscribe_operator(&self) -> broadcast::Receiver<AggregateSnapshot> {
        self.operator_channel.subscribe()
    }

    /// Publishes one snapshot tick for a connected session. A send with no
    /// subscribed receiver is a no-op (the subscriber simply hasn't opened
    /// a channel); a full channel drops the oldest queued value rather
    /// than blocking, which is `broadcast`'s native lagging behavior.
    #[instrument(skip(self))]
    pub async fn publish_tick(&self, subscriber_id: Uuid, session_id: Uuid) -> Result<()> {
        let Some(session) = self.sessions.get(session_id).await? else {
            return Ok(());
        };
        if !session.is_connected() {
            return Ok(());
        }
        let now = self.clock.now();
        let server = match session.server_id {
            Some(id) => self.servers.get(id).await?,
            None => None,
        };

        let snapshot = SessionSnapshot {
            timestamp: now,
            session_id,
            status: "connected",
            total_bytes: session.total_bytes(),
            throughput_mbps: session.throughput_mbps(now),
            latency_ms: server.as_ref().map(|s| s.latency_ms),
            server_load: server.as_ref().map(|s| s.current_load),
        };
        self.send_to(subscriber_id, snapshot);
        Ok(())
    }

    /// Emits the final snapshot for a session that just disconnected, then
    /// drops the subscriber's channel sender so the receiver observes the
    /// stream end.
    #[instrument(skip(self))]
    pub fn publish_final(&self, subscriber_id: Uuid, session_id: Uuid, total_bytes: u64, throughput_mbps: Option<f64>) {
        let snapshot = SessionSnapshot {
            timestamp: self.clock.now(),
            session_id,
            status: "disconnected",
            total_bytes,
            throughput_mbps,
            latency_ms: None,
            server_load: None,
        };
        self.send_to(subscriber_id, snapshot);
        self.channels.lock().expect("metrics channel registry lock poisoned").remove(&subscriber_id);
    }

    fn send_to(&self, subscriber_id: Uuid, snapshot: SessionSnapshot) {
        let channels = self.channels.lock().expect("metrics channel registry lock poisoned");
        if let Some(tx) = channels.get(&subscriber_id) {
            // No receivers is the common case between subscribes; ignore.
            let _ = tx.send(snapshot);
        }
    }

    /// Computes and fans out one operator aggregate tick. Intended to run
    /// on a `tokio::time::interval` ticker alongside the reconcile tasks.
    #[instrument(skip(self))]
    pub async fn publish_aggregate(&self, total_subscribers: u64) -> Result<()> {
        let servers = self.registry.list(&crate::ports::repos::ServerFilter::default()).await?;
        let active_servers = servers
            .iter()
            .filter(|s| s.status == crate::domain::ServerStatus::Active)
            .count() as u64;

        let mut active_sessions = 0u64;
        let mut alerts = Vec::new();
        for server in &servers {
            let connected = self.servers.count_connected_sessions(server.id).await?;
            active_sessions += connected;
            if server.current_load >= 0.95 {
                alerts.push(format!("server {} near capacity ({:.0}% load)", server.hostname, server.current_load * 100.0));
            }
        }

        let snapshot = AggregateSnapshot {
            timestamp: self.clock.now(),
            total_subscribers,
            active_sessions,
            active_servers,
            alerts,
        };
        let _ = self.operator_channel.send(snapshot);
        Ok(())
    }
}

/// Spawns the periodic background task that drives `publish_aggregate` on
/// the configured cadence. Returns the `JoinHandle` so the caller can
/// cancel it on shutdown.
pub fn spawn_aggregate_ticker(
    metrics: Arc<MetricsPush>,
    interval: Duration,
    total_subscribers: impl Fn() -> u64 + Send + Sync + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(error) = metrics.publish_aggregate(total_subscribers()).await {
                tracing::warn!(%error, "operator aggregate tick failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // `publish_tick`/`publish_aggregate` depend on the repo ports and are
    // covered against the in-memory adapter in vpn-core-memory's
    // integration tests. This module exercises the channel registry's
    // forced-close invariant directly.

    #[tokio::test]
    async fn second_subscribe_closes_first_channel() {
        let channels: Mutex<HashMap<Uuid, broadcast::Sender<SessionSnapshot>>> = Mutex::new(HashMap::new());
        let subscriber_id = Uuid::new_v4();

        let (tx1, mut rx1) = broadcast::channel(CHANNEL_CAPACITY);
        channels.lock().unwrap().insert(subscriber_id, tx1);

        let (tx2, mut rx2) = broadcast::channel(CHANNEL_CAPACITY);
        channels.lock().unwrap().insert(subscriber_id, tx2.clone());

        let snapshot = SessionSnapshot {
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            status: "connected",
            total_bytes: 0,
            throughput_mbps: None,
            latency_ms: None,
            server_load: None,
        };
        tx2.send(snapshot).unwrap();

        assert!(rx1.recv().await.is_err());
        assert!(rx2.recv().await.is_ok());
    }
}
