//! Session Manager: the connection admission state machine — connect,
//! select server, allocate tunnel parameters, record the open session,
//! finalize on disconnect with accounting, keep server load in step
//! as sessions close.

mod address_pool;
mod tunnel_config;

pub use tunnel_config::TunnelConfig;

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Server, Session, Tier};
use crate::entitlement::EntitlementEngine;
use crate::error::{AppError, Result};
use crate::identity::IdentityStore;
use crate::ports::{Clock, ServerRepo, SessionRepo, UsageLogRepo};
use crate::servers::ServerRegistry;

use address_pool::allocate_client_address;

/// What `connect` hands back to the caller: enough for the client to dial
/// in immediately, plus the rendered configuration blob.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub session_id: Uuid,
    pub server: Server,
    pub assigned_address: std::net::IpAddr,
    pub tunnel_config: TunnelConfig,
}

/// What `disconnect` hands back: the closed session's accounting summary.
#[derive(Debug, Clone)]
pub struct DisconnectOutcome {
    pub session_id: Uuid,
    pub duration_seconds: i64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_bytes: u64,
    pub throughput_mbps: Option<f64>,
}

/// A point-in-time view of a subscriber's session, for the `status` call
/// and for Metrics Push snapshots.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub server: Option<Server>,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionRepo>,
    servers: Arc<dyn ServerRepo>,
    usage_logs: Arc<dyn UsageLogRepo>,
    registry: Arc<ServerRegistry>,
    identity: Arc<IdentityStore>,
    entitlement: Arc<EntitlementEngine>,
    clock: Arc<dyn Clock>,
    /// Tunnel parameters shared by every rendered config: DNS pair and the
    /// default routed-prefix set, both configurable.
    default_dns: (std::net::IpAddr, std::net::IpAddr),
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepo>,
        servers: Arc<dyn ServerRepo>,
        usage_logs: Arc<dyn UsageLogRepo>,
        registry: Arc<ServerRegistry>,
        identity: Arc<IdentityStore>,
        entitlement: Arc<EntitlementEngine>,
        clock: Arc<dyn Clock>,
        default_dns: (std::net::IpAddr, std::net::IpAddr),
    ) -> Self {
        Self { sessions, servers, usage_logs, registry, identity, entitlement, clock, default_dns }
    }

    /// Admits a connect request, running the full admission procedure:
    /// entitlement check, rate/ban check, server selection, address
    /// allocation, and session record insertion.
    #[instrument(skip(self, client_public_key))]
    pub async fn connect(
        &self,
        subscriber_handle: i64,
        location: Option<&str>,
        client_public_key: &str,
        request_premium: bool,
    ) -> Result<ConnectOutcome> {
        let subscriber = self.identity.get_by_handle(subscriber_handle).await?;
        if !subscriber.active {
            return Err(AppError::Disabled);
        }
        if !subscriber.verified {
            return Err(AppError::Unverified);
        }

        let entitlement = self.entitlement.resolve(subscriber.id).await?;

        if request_premium && entitlement.tier == Tier::Free {
            return Err(AppError::PremiumRequired { upgrade_plan_id: None });
        }

        if let Some(existing) = self.sessions.get_connected_for_subscriber(subscriber.id).await? {
            return Err(AppError::AlreadyConnected { session_id: existing.id });
        }

        let server = self.registry.select(entitlement.tier, location).await?;

        let leased = self.sessions.leased_addresses(server.id).await?;
        let assigned_address = allocate_client_address(&server, &leased)?;

        let now = self.clock.now();
        let session = Session::open(
            Uuid::new_v4(),
            subscriber.id,
            server.id,
            assigned_address,
            client_public_key.to_string(),
            now,
        );

        // The partial-unique-index-backed insert is the serialization
        // point for concurrent connects on the same subscriber: a second
        // racing caller's `try_open` loses this race and surfaces
        // `AlreadyConnected`, never a second connected row.
        if let Err(e) = self.sessions.try_open(&session).await {
            return match e {
                crate::error::StoreError::Conflict => {
                    let existing = self
                        .sessions
                        .get_connected_for_subscriber(subscriber.id)
                        .await?
                        .ok_or(AppError::Internal)?;
                    Err(AppError::AlreadyConnected { session_id: existing.id })
                }
                other => Err(other.into()),
            };
        }

        self.servers.adjust_load(server.id, server.load_step()).await?;
        self.usage_logs.open(session.id, subscriber.id, server.id, now).await?;

        let tunnel_config = TunnelConfig::render(&server, assigned_address, self.default_dns);

        Ok(ConnectOutcome {
            session_id: session.id,
            server,
            assigned_address,
            tunnel_config,
        })
    }

    /// Finalizes a session with client-reported accounting. A disconnect
    /// on an already-disconnected session is treated as an idempotent
    /// success (see DESIGN.md for why this implementation picked that
    /// branch in DESIGN.md), returning the session's existing
    /// summary rather than erroring.
    #[instrument(skip(self))]
    pub async fn disconnect(
        &self,
        session_id: Uuid,
        subscriber_id: Uuid,
        bytes_sent: u64,
        bytes_received: u64,
    ) -> Result<DisconnectOutcome> {
        let session = self.sessions.get(session_id).await?.ok_or(AppError::NotFound)?;
        if session.subscriber_id != subscriber_id {
            return Err(AppError::NotFound);
        }

        if !session.is_connected() {
            return Ok(summarize(&session, self.clock.now()));
        }

        let now = self.clock.now();
        let closed = self.close_with_retry(session_id, now, bytes_sent, bytes_received, false).await?;

        if let Some(server_id) = closed.server_id {
            if let Some(server) = self.servers.get(server_id).await? {
                self.servers.adjust_load(server_id, -server.load_step()).await?;
            }
        }

        let data_mb = closed.total_bytes() as f64 / (1024.0 * 1024.0);
        if let Some(log) = self.usage_logs.get_open_for_session(closed.id).await? {
            self.usage_logs.close(log.id, now, data_mb).await?;
        }

        Ok(summarize(&closed, now))
    }

    /// Retries the store's close at most three times with doubling backoff
    /// on a transient store failure.
    async fn close_with_retry(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
        bytes_sent: u64,
        bytes_received: u64,
        ended_by_timeout: bool,
    ) -> Result<Session> {
        let mut delay = std::time::Duration::from_millis(50);
        let mut attempts = 0;
        loop {
            match self
                .sessions
                .close(session_id, ended_at, bytes_sent, bytes_received, ended_by_timeout)
                .await
            {
                Ok(session) => return Ok(session),
                Err(crate::error::StoreError::Unavailable) if attempts < 3 => {
                    attempts += 1;
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns the subscriber's current (or, if none is connected, most
    /// recent) session snapshot, resolving the server descriptor
    /// alongside it.
    #[instrument(skip(self))]
    pub async fn status(&self, subscriber_id: Uuid, session_id: Option<Uuid>) -> Result<SessionSnapshot> {
        let session = match session_id {
            Some(id) => self.sessions.get(id).await?.filter(|s| s.subscriber_id == subscriber_id),
            None => self.sessions.get_connected_for_subscriber(subscriber_id).await?,
        };
        let session = match session {
            Some(s) => s,
            None => self
                .sessions
                .get_latest_for_subscriber(subscriber_id)
                .await?
                .ok_or(AppError::NotFound)?,
        };

        let server = match session.server_id {
            Some(id) => self.servers.get(id).await?,
            None => None,
        };

        Ok(SessionSnapshot { session, server })
    }

    /// Force-disconnects sessions whose `started_at` is older than
    /// `stale_threshold_secs` without a more recent liveness signal,
    /// marking them `ended_by=timeout` and decrementing server load.
    /// Intended to run on a periodic interval.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, stale_threshold_secs: i64) -> Result<u64> {
        let now = self.clock.now();
        let cutoff = now - ChronoDuration::seconds(stale_threshold_secs);
        let stale = self.sessions.list_stale_connected(cutoff).await?;
        let mut reconciled = 0u64;
        for session in stale {
            let closed = self
                .close_with_retry(session.id, now, session.bytes_sent, session.bytes_received, true)
                .await?;
            if let Some(server_id) = closed.server_id {
                if let Some(server) = self.servers.get(server_id).await? {
                    self.servers.adjust_load(server_id, -server.load_step()).await?;
                }
            }
            let data_mb = closed.total_bytes() as f64 / (1024.0 * 1024.0);
            if let Some(log) = self.usage_logs.get_open_for_session(closed.id).await? {
                self.usage_logs.close(log.id, now, data_mb).await?;
            }
            reconciled += 1;
        }
        Ok(reconciled)
    }
}

fn summarize(session: &Session, now: DateTime<Utc>) -> DisconnectOutcome {
    DisconnectOutcome {
        session_id: session.id,
        duration_seconds: session.duration_seconds(now),
        bytes_sent: session.bytes_sent,
        bytes_received: session.bytes_received,
        total_bytes: session.total_bytes(),
        throughput_mbps: session.throughput_mbps(now),
    }
}
