use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::{
    Payment, PaymentStatus, Plan, Server, ServerStatus, Session, Subscriber, Subscription,
    SubscriptionStatus, Tier, UsageLog, VerificationCode, VerificationPurpose,
};
use crate::error::StoreError;

#[async_trait]
pub trait SubscriberRepo: Send + Sync {
    async fn insert(&self, subscriber: &Subscriber) -> Result<(), StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Subscriber>, StoreError>;
    async fn get_by_handle(&self, handle: i64) -> Result<Option<Subscriber>, StoreError>;
    /// `email` must already be normalized (lowercase, trimmed) by the caller.
    async fn get_by_email(&self, email: &str) -> Result<Option<Subscriber>, StoreError>;
    async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        phone: Option<&str>,
        country: Option<&str>,
    ) -> Result<(), StoreError>;
    async fn update_status(
        &self,
        id: Uuid,
        active: Option<bool>,
        premium: Option<bool>,
        superuser: Option<bool>,
    ) -> Result<(), StoreError>;
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;
    /// Sets `verified = true`, the one-way transition `VerificationCodes`
    /// drives on a successful `email_verify` code check.
    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PlanRepo: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Plan>, StoreError>;
    async fn list_active(&self) -> Result<Vec<Plan>, StoreError>;
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError>;
    /// Most recent subscription for the subscriber, by `start_time`,
    /// regardless of status; this is what EE's `resolve` algorithm
    /// consults.
    async fn get_latest_for_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError>;
    /// Every subscription currently recorded as `Active`, expired or not —
    /// the candidate set EE's reconcile pass walks to find ones whose
    /// `end_time` has passed.
    async fn list_active(&self) -> Result<Vec<Subscription>, StoreError>;
    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> Result<(), StoreError>;
    async fn activate(
        &self,
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn set_auto_renew(&self, id: Uuid, auto_renew: bool) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> Result<(), StoreError>;
    async fn has_success_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<bool, StoreError>;
}

/// Selection filter for `ServerRepo::list`. `tier_at_most` restricts to
/// servers whose tier the caller's entitlement satisfies; `location`, when
/// set, is an exact-match filter the Server Registry's selection algorithm
/// falls back from if it would empty the candidate set.
#[derive(Debug, Clone, Default)]
pub struct ServerFilter {
    pub tier_at_most: Option<Tier>,
    pub location: Option<String>,
    pub status: Option<ServerStatus>,
}

#[async_trait]
pub trait ServerRepo: Send + Sync {
    async fn list(&self, filter: &ServerFilter) -> Result<Vec<Server>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Server>, StoreError>;
    async fn insert(&self, server: &Server) -> Result<(), StoreError>;
    async fn update(&self, server: &Server) -> Result<(), StoreError>;
    /// Deletes the server outright only if no session references it
    /// (connected or not); otherwise the caller should set
    /// `status = offline` instead and call `update`.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
    async fn has_session_references(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Atomic read-modify-write: adds `delta` to `current_load`, clamped to
    /// `[0, 1]`, and returns the resulting value.
    async fn adjust_load(&self, id: Uuid, delta: f64) -> Result<f64, StoreError>;
    async fn set_load(&self, id: Uuid, load: f64) -> Result<(), StoreError>;
    /// Count of sessions currently connected through this server; used both
    /// for the registry's capacity check and its periodic reconcile.
    async fn count_connected_sessions(&self, id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Attempts to open a new connected session for `session.subscriber_id`,
    /// enforcing the one-connected-session-per-subscriber invariant. Fails
    /// with `StoreError::Conflict` if one is already connected; this is the
    /// single serialization point for concurrent connect calls (backed, in
    /// a real store, by the partial unique index on
    /// `sessions(subscriber) where status='connected'`).
    async fn try_open(&self, session: &Session) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
    async fn get_connected_for_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Session>, StoreError>;
    async fn get_latest_for_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Session>, StoreError>;
    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        bytes_sent: u64,
        bytes_received: u64,
        ended_by_timeout: bool,
    ) -> Result<Session, StoreError>;
    /// In-tunnel addresses currently leased to connected sessions on
    /// `server_id`, used by address allocation to avoid a collision.
    async fn leased_addresses(&self, server_id: Uuid) -> Result<Vec<IpAddr>, StoreError>;
    /// Connected sessions whose `started_at` predates `older_than` and that
    /// have shown no liveness since; candidates for the reconcile task's
    /// forced disconnect.
    async fn list_stale_connected(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;
}

#[async_trait]
pub trait UsageLogRepo: Send + Sync {
    /// Opens a log row keyed by `session_id`, so `close` can be reached
    /// from the session alone without threading a separate log id through
    /// the session row.
    async fn open(
        &self,
        session_id: Uuid,
        subscriber_id: Uuid,
        server_id: Uuid,
        connected_at: DateTime<Utc>,
    ) -> Result<Uuid, StoreError>;
    async fn close(
        &self,
        log_id: Uuid,
        disconnected_at: DateTime<Utc>,
        data_mb: f64,
    ) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<UsageLog>, StoreError>;
    async fn get_open_for_session(&self, session_id: Uuid) -> Result<Option<UsageLog>, StoreError>;
}

#[async_trait]
pub trait VerificationCodeRepo: Send + Sync {
    async fn get_unconsumed(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationCode>, StoreError>;
    /// Invalidates (marks consumed, without matching) any prior unconsumed
    /// code for `(email, purpose)` and stores `code` in its place. This is
    /// one atomic replace, matching the "at most one unconsumed code"
    /// invariant.
    async fn issue(&self, code: &VerificationCode) -> Result<(), StoreError>;
    async fn mark_consumed(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<(), StoreError>;
    async fn record_failed_attempt(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<u8, StoreError>;
    async fn invalidate(&self, email: &str, purpose: VerificationPurpose) -> Result<(), StoreError>;
}
