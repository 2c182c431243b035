//! A single in-process store backing every relational-style port.
//! Collapsing `SubscriberRepo`/`ServerRepo`/`SessionRepo`/etc. onto one
//! struct (rather than one `RwLock` per adapter struct) is what lets
//! `ServerRepo::count_connected_sessions` see the session table directly,
//! the way a real relational store's foreign key would.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use vpn_core::domain::{
    Payment, PaymentStatus, Plan, Server, ServerStatus, Session, SessionStatus, Subscriber,
    Subscription, SubscriptionStatus, UsageLog, VerificationCode, VerificationPurpose,
};
use vpn_core::error::StoreError;
use vpn_core::ports::repos::ServerFilter;
use vpn_core::ports::{
    PaymentRepo, PlanRepo, ServerRepo, SessionRepo, SubscriberRepo, SubscriptionRepo,
    UsageLogRepo, VerificationCodeRepo,
};

#[derive(Default)]
pub struct MemoryStore {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    plans: RwLock<HashMap<Uuid, Plan>>,
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    payments: RwLock<HashMap<Uuid, Payment>>,
    servers: RwLock<HashMap<Uuid, Server>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    usage_logs: RwLock<HashMap<Uuid, UsageLog>>,
    verification_codes: RwLock<HashMap<(String, VerificationPurposeKey), VerificationCode>>,
}

/// `VerificationPurpose` isn't `Hash`/`Eq`-derived in the domain crate (it
/// only needs `PartialEq` there); this newtype gives the store a hashable
/// key without changing the domain type's derives for everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum VerificationPurposeKey {
    EmailVerify,
    PasswordReset,
}

impl From<VerificationPurpose> for VerificationPurposeKey {
    fn from(p: VerificationPurpose) -> Self {
        match p {
            VerificationPurpose::EmailVerify => VerificationPurposeKey::EmailVerify,
            VerificationPurpose::PasswordReset => VerificationPurposeKey::PasswordReset,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seed helper: inserts a plan directly, bypassing the
    /// subscription-assignment flow.
    pub async fn seed_plan(&self, plan: Plan) {
        self.plans.write().await.insert(plan.id, plan);
    }

    /// Test/seed helper: inserts a server directly.
    pub async fn seed_server(&self, server: Server) {
        self.servers.write().await.insert(server.id, server);
    }
}

#[async_trait]
impl SubscriberRepo for MemoryStore {
    async fn insert(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.values().any(|s| s.email == subscriber.email) {
            return Err(StoreError::Conflict);
        }
        subscribers.insert(subscriber.id, subscriber.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.subscribers.read().await.get(&id).cloned())
    }

    async fn get_by_handle(&self, handle: i64) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.subscribers.read().await.values().find(|s| s.handle == handle).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.subscribers.read().await.values().find(|s| s.email == email).cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        phone: Option<&str>,
        country: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = display_name {
            subscriber.display_name = name.to_string();
        }
        if let Some(phone) = phone {
            subscriber.phone = Some(phone.to_string());
        }
        if let Some(country) = country {
            subscriber.country = Some(country.to_string());
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        active: Option<bool>,
        premium: Option<bool>,
        superuser: Option<bool>,
    ) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(active) = active {
            subscriber.active = active;
        }
        if let Some(premium) = premium {
            subscriber.premium = premium;
        }
        if let Some(superuser) = superuser {
            subscriber.superuser = superuser;
        }
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.get_mut(&id).ok_or(StoreError::NotFound)?;
        subscriber.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.get_mut(&id).ok_or(StoreError::NotFound)?;
        subscriber.verified = true;
        Ok(())
    }
}

#[async_trait]
impl PlanRepo for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        Ok(self.plans.read().await.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Plan>, StoreError> {
        Ok(self
            .plans
            .read()
            .await
            .values()
            .filter(|p| p.assignable())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubscriptionRepo for MemoryStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.subscriptions.write().await.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn get_latest_for_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.subscriber_id == subscriber_id)
            .max_by_key(|s| s.start_time)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions.get_mut(&id).ok_or(StoreError::NotFound)?;
        subscription.status = status;
        Ok(())
    }

    async fn activate(
        &self,
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions.get_mut(&id).ok_or(StoreError::NotFound)?;
        subscription.start_time = start_time;
        subscription.end_time = end_time;
        subscription.status = SubscriptionStatus::Active;
        Ok(())
    }

    async fn set_auto_renew(&self, id: Uuid, auto_renew: bool) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions.get_mut(&id).ok_or(StoreError::NotFound)?;
        subscription.auto_renew = auto_renew;
        Ok(())
    }
}

#[async_trait]
impl PaymentRepo for MemoryStore {
    async fn insert(&self, payment: &Payment) -> Result<(), StoreError> {
        self.payments.write().await.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        let payment = payments.get_mut(&id).ok_or(StoreError::NotFound)?;
        payment.status = status;
        Ok(())
    }

    async fn has_success_for_subscription(&self, subscription_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .any(|p| p.subscription_id == subscription_id && p.status == PaymentStatus::Success))
    }
}

#[async_trait]
impl ServerRepo for MemoryStore {
    async fn list(&self, filter: &ServerFilter) -> Result<Vec<Server>, StoreError> {
        Ok(self
            .servers
            .read()
            .await
            .values()
            .filter(|s| filter.tier_at_most.map_or(true, |t| s.tier <= t))
            .filter(|s| filter.location.as_deref().map_or(true, |loc| s.location == loc))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Server>, StoreError> {
        Ok(self.servers.read().await.get(&id).cloned())
    }

    async fn insert(&self, server: &Server) -> Result<(), StoreError> {
        self.servers.write().await.insert(server.id, server.clone());
        Ok(())
    }

    async fn update(&self, server: &Server) -> Result<(), StoreError> {
        let mut servers = self.servers.write().await;
        if !servers.contains_key(&server.id) {
            return Err(StoreError::NotFound);
        }
        servers.insert(server.id, server.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.servers.write().await.remove(&id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn has_session_references(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.sessions.read().await.values().any(|s| s.server_id == Some(id)))
    }

    async fn adjust_load(&self, id: Uuid, delta: f64) -> Result<f64, StoreError> {
        let mut servers = self.servers.write().await;
        let server = servers.get_mut(&id).ok_or(StoreError::NotFound)?;
        server.current_load = Server::clamp_load(server.current_load + delta);
        Ok(server.current_load)
    }

    async fn set_load(&self, id: Uuid, load: f64) -> Result<(), StoreError> {
        let mut servers = self.servers.write().await;
        let server = servers.get_mut(&id).ok_or(StoreError::NotFound)?;
        server.current_load = Server::clamp_load(load);
        Ok(())
    }

    async fn count_connected_sessions(&self, id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.server_id == Some(id) && s.status == SessionStatus::Connected)
            .count() as u64)
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn try_open(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        // The single serialization point: holding the write lock across
        // this check-then-insert is what a partial unique index gives a
        // relational store for free.
        let already_connected = sessions
            .values()
            .any(|s| s.subscriber_id == session.subscriber_id && s.status == SessionStatus::Connected);
        if already_connected {
            return Err(StoreError::Conflict);
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn get_connected_for_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.subscriber_id == subscriber_id && s.status == SessionStatus::Connected)
            .cloned())
    }

    async fn get_latest_for_subscriber(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.subscriber_id == subscriber_id)
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        bytes_sent: u64,
        bytes_received: u64,
        ended_by_timeout: bool,
    ) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.status = SessionStatus::Disconnected;
        session.ended_at = Some(ended_at);
        session.bytes_sent = bytes_sent;
        session.bytes_received = bytes_received;
        session.ended_by_timeout = ended_by_timeout;
        Ok(session.clone())
    }

    async fn leased_addresses(&self, server_id: Uuid) -> Result<Vec<IpAddr>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.server_id == Some(server_id) && s.status == SessionStatus::Connected)
            .map(|s| s.client_address)
            .collect())
    }

    async fn list_stale_connected(&self, older_than: DateTime<Utc>) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Connected && s.started_at < older_than)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UsageLogRepo for MemoryStore {
    async fn open(
        &self,
        session_id: Uuid,
        subscriber_id: Uuid,
        server_id: Uuid,
        connected_at: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        let log = UsageLog {
            id: session_id,
            subscriber_id,
            server_id,
            connected_at,
            disconnected_at: None,
            data_mb: None,
        };
        self.usage_logs.write().await.insert(log.id, log);
        Ok(session_id)
    }

    async fn close(&self, log_id: Uuid, disconnected_at: DateTime<Utc>, data_mb: f64) -> Result<(), StoreError> {
        let mut logs = self.usage_logs.write().await;
        let log = logs.get_mut(&log_id).ok_or(StoreError::NotFound)?;
        log.disconnected_at = Some(disconnected_at);
        log.data_mb = Some(data_mb);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UsageLog>, StoreError> {
        Ok(self.usage_logs.read().await.get(&id).cloned())
    }

    async fn get_open_for_session(&self, session_id: Uuid) -> Result<Option<UsageLog>, StoreError> {
        // The log id is the session id (see `open` above), so this is a
        // direct lookup rather than a scan.
        Ok(self
            .usage_logs
            .read()
            .await
            .get(&session_id)
            .filter(|l| l.disconnected_at.is_none())
            .cloned())
    }
}

#[async_trait]
impl VerificationCodeRepo for MemoryStore {
    async fn get_unconsumed(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationCode>, StoreError> {
        Ok(self
            .verification_codes
            .read()
            .await
            .get(&(email.to_string(), purpose.into()))
            .filter(|c| !c.consumed)
            .cloned())
    }

    async fn issue(&self, code: &VerificationCode) -> Result<(), StoreError> {
        self.verification_codes
            .write()
            .await
            .insert((code.email.clone(), code.purpose.into()), code.clone());
        Ok(())
    }

    async fn mark_consumed(&self, email: &str, purpose: VerificationPurpose) -> Result<(), StoreError> {
        let mut codes = self.verification_codes.write().await;
        let code = codes.get_mut(&(email.to_string(), purpose.into())).ok_or(StoreError::NotFound)?;
        code.consumed = true;
        Ok(())
    }

    async fn record_failed_attempt(&self, email: &str, purpose: VerificationPurpose) -> Result<u8, StoreError> {
        let mut codes = self.verification_codes.write().await;
        let code = codes.get_mut(&(email.to_string(), purpose.into())).ok_or(StoreError::NotFound)?;
        code.attempts = code.attempts.saturating_add(1);
        Ok(code.attempts)
    }

    async fn invalidate(&self, email: &str, purpose: VerificationPurpose) -> Result<(), StoreError> {
        let mut codes = self.verification_codes.write().await;
        if let Some(code) = codes.get_mut(&(email.to_string(), purpose.into())) {
            code.consumed = true;
        }
        Ok(())
    }
}
