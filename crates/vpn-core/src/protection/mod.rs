//! Protection Layer: sliding-window rate limiting, automatic IP banning on
//! DDoS/suspicious-activity thresholds, and whitelist bypass, fronting
//! every operation.

mod whitelist;

pub use whitelist::Whitelist;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::config::{Config, RateLimitPolicy};
use crate::error::{AppError, Result};
use crate::ports::KvStore;
use crate::telemetry::sanitize_ip;

/// Coarse-grained label attached to each operation, used to look up a rate
/// limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    AuthRegister,
    AuthVerifyEmail,
    AuthLogin,
    AuthPasswordReset,
    UsersProfile,
    Subscriptions,
    VpnServersList,
    VpnConnect,
    VpnDisconnect,
    VpnStatus,
    Payments,
    WebsocketSession,
    WebsocketAdmin,
    /// The shared `websocket` policy bucket; both
    /// `WebsocketSession` and `WebsocketAdmin` map to it (the operator
    /// channel is separately exempt from rate limiting entirely — see
    /// `MetricsPush`).
    Websocket,
    General,
}

impl EndpointClass {
    /// Endpoint classes without a dedicated entry in `Config::endpoint_policies`
    /// fall back to the one they most resemble, so every class has a
    /// defined policy without a sparse, error-prone duplicate table.
    fn policy_key(self) -> EndpointClass {
        use EndpointClass::*;
        match self {
            AuthVerifyEmail => AuthLogin,
            UsersProfile | Subscriptions | VpnServersList | VpnStatus => General,
            WebsocketSession | WebsocketAdmin => Websocket,
            other => other,
        }
    }
}

/// Outcome of an admitted request, for the observability outputs this layer
/// requires (current count, remaining, reset time).
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub count: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Caller identity the Protection Layer reasons about: always an IP, and
/// for authenticated endpoints also a subscriber identifier.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub ip: String,
    pub subscriber_id: Option<uuid::Uuid>,
    /// Administrative bypass: super-user callers skip both subsystems.
    pub is_superuser: bool,
}

pub struct ProtectionLayer {
    kv: Arc<dyn KvStore>,
    config: Config,
    whitelist: Whitelist,
}

impl ProtectionLayer {
    pub fn new(kv: Arc<dyn KvStore>, config: Config) -> Self {
        let whitelist = Whitelist::parse(&config.ddos_whitelist);
        Self { kv, config, whitelist }
    }

    /// Runs the full policy precedence for one inbound request:
    /// ban check -> DDoS count -> endpoint rate limit -> global IP cap ->
    /// global process cap. The first failing check short-circuits.
    #[instrument(skip(self, caller), fields(ip = %sanitize_ip(&caller.ip)))]
    pub async fn admit(&self, caller: &CallerContext, endpoint: EndpointClass) -> Result<RateLimitStatus> {
        if caller.is_superuser || self.whitelist.contains(&caller.ip) {
            return Ok(RateLimitStatus { count: 0, remaining: u32::MAX, reset_at: Utc::now() });
        }

        let now = Utc::now();

        if self.config.ddos_protection_enabled {
            self.check_ban(&caller.ip, now).await?;
            self.check_ddos(&caller.ip, now).await?;
        }

        if self.config.rate_limit_enabled {
            let status = self.check_endpoint_limit(caller, endpoint, now).await?;
            self.check_global_ip_cap(&caller.ip, now).await?;
            self.check_global_process_cap(now).await?;
            return Ok(status);
        }

        Ok(RateLimitStatus { count: 0, remaining: u32::MAX, reset_at: now })
    }

    async fn check_ban(&self, ip: &str, now: DateTime<Utc>) -> Result<()> {
        if let Some(ban) = self.kv.get_ban(ip, now).await? {
            let retry_after_secs = ban.retry_after_secs(now);
            warn!(ip = %sanitize_ip(ip), reason = %ban.reason, retry_after_secs, "request from banned ip rejected");
            return Err(AppError::Banned { retry_after_secs });
        }
        Ok(())
    }

    async fn check_ddos(&self, ip: &str, now: DateTime<Utc>) -> Result<()> {
        let key = format!("ddos:{ip}");
        let count = self.kv.record_hit(&key, now, 60).await?;
        if count > self.config.ddos_threshold as u64 {
            self.ban(ip, "ddos_threshold_exceeded", self.config.ddos_ban_duration_secs, now)
                .await?;
            return Err(AppError::Banned {
                retry_after_secs: self.config.ddos_ban_duration_secs as u64,
            });
        }
        Ok(())
    }

    /// Called by the caller (Identity Store's `authenticate`, typically) on
    /// every failed-auth event, independent of the main `admit` path, so
    /// the suspicious-activity window tracks failures even when the
    /// endpoint-level rate limit itself was not exceeded.
    #[instrument(skip(self))]
    pub async fn record_failed_auth(&self, ip: &str) -> Result<()> {
        if !self.config.ddos_protection_enabled {
            return Ok(());
        }
        let now = Utc::now();
        let key = format!("suspicious:{ip}");
        let count = self.kv.record_hit(&key, now, self.config.suspicious_window_secs).await?;
        if count > self.config.suspicious_threshold as u64 {
            self.ban(
                ip,
                "suspicious_activity_threshold_exceeded",
                self.config.suspicious_ban_duration_secs,
                now,
            )
            .await?;
        }
        Ok(())
    }

    async fn ban(&self, ip: &str, reason: &str, ttl_secs: i64, now: DateTime<Utc>) -> Result<()> {
        warn!(ip = %sanitize_ip(ip), reason, ttl_secs, "banning ip");
        self.kv.set_ban(ip, reason, ttl_secs, now).await?;
        Ok(())
    }

    async fn check_endpoint_limit(
        &self,
        caller: &CallerContext,
        endpoint: EndpointClass,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus> {
        let policy = self.policy_for(endpoint);
        let key = match caller.subscriber_id {
            Some(id) => format!("rl:{:?}:{}", endpoint.policy_key(), id),
            None => format!("rl:{:?}:{}", endpoint.policy_key(), caller.ip),
        };
        self.enforce(&key, &policy, now).await
    }

    async fn check_global_ip_cap(&self, ip: &str, now: DateTime<Utc>) -> Result<()> {
        let policy = RateLimitPolicy {
            limit: self.config.ip_rate_limit_per_min,
            window_secs: 60,
            burst_allowance: 0,
        };
        let key = format!("rl:global_ip:{ip}");
        self.enforce(&key, &policy, now).await.map(|_| ())
    }

    async fn check_global_process_cap(&self, now: DateTime<Utc>) -> Result<()> {
        let policy = RateLimitPolicy {
            limit: self.config.global_rate_limit_per_min,
            window_secs: 60,
            burst_allowance: 0,
        };
        self.enforce("rl:global_process", &policy, now).await.map(|_| ())
    }

    fn policy_for(&self, endpoint: EndpointClass) -> RateLimitPolicy {
        self.config
            .endpoint_policies
            .get(&endpoint.policy_key())
            .cloned()
            .unwrap_or(RateLimitPolicy { limit: 60, window_secs: 60, burst_allowance: 20 })
    }

    /// A request is admitted if `count(key, window) < limit + burst`, then
    /// the counter is incremented. The counter is a sorted sequence of
    /// timestamps with lazy eviction of entries outside the window.
    async fn enforce(&self, key: &str, policy: &RateLimitPolicy, now: DateTime<Utc>) -> Result<RateLimitStatus> {
        let current = self.kv.count(key, now, policy.window_secs).await?;
        if current as u32 >= policy.cap() {
            let retry_after_secs = policy.window_secs.max(0) as u64;
            return Err(AppError::RateLimited { retry_after_secs });
        }
        let count = self.kv.record_hit(key, now, policy.window_secs).await?;
        Ok(RateLimitStatus {
            count: count as u32,
            remaining: policy.cap().saturating_sub(count as u32),
            reset_at: now + chrono::Duration::seconds(policy.window_secs),
        })
    }
}
