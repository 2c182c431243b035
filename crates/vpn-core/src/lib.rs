//! Session and access-control engine for the VPN service control plane:
//! identity, entitlement, server selection, rate limiting/DDoS
//! protection, session lifecycle, metrics push, and verification codes,
//! each behind a port trait satisfied by a separate adapter crate.

pub mod auth;
pub mod config;
pub mod domain;
pub mod entitlement;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod ports;
pub mod protection;
pub mod servers;
pub mod sessions;
pub mod telemetry;
pub mod verification;

use std::net::IpAddr;
use std::sync::Arc;

use auth::TokenService;
use config::Config;
use entitlement::EntitlementEngine;
use identity::IdentityStore;
use metrics::MetricsPush;
use ports::{
    Clock, EmailTransport, KvStore, PaymentRepo, PlanRepo, ServerRepo, SessionRepo,
    SubscriberRepo, SubscriptionRepo, UsageLogRepo, VerificationCodeRepo,
};
use protection::ProtectionLayer;
use servers::ServerRegistry;
use sessions::SessionManager;
use verification::VerificationCodes;

/// Every port implementation the engine needs, handed in by whatever
/// binary wires up concrete adapters (`vpn-core-memory` for tests and
/// local development).
pub struct Adapters {
    pub subscribers: Arc<dyn SubscriberRepo>,
    pub plans: Arc<dyn PlanRepo>,
    pub subscriptions: Arc<dyn SubscriptionRepo>,
    pub payments: Arc<dyn PaymentRepo>,
    pub servers: Arc<dyn ServerRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    pub usage_logs: Arc<dyn UsageLogRepo>,
    pub verification_codes: Arc<dyn VerificationCodeRepo>,
    pub kv: Arc<dyn KvStore>,
    pub email: Arc<dyn EmailTransport>,
    pub clock: Arc<dyn Clock>,
}

/// Composition root: every component of the control plane, wired against
/// a single set of adapters and configuration. Each component is also
/// independently usable; this struct exists purely for convenient
/// construction by the (out-of-scope) HTTP layer.
pub struct Engine {
    pub tokens: TokenService,
    pub identity: Arc<IdentityStore>,
    pub entitlement: Arc<EntitlementEngine>,
    pub server_registry: Arc<ServerRegistry>,
    pub protection: Arc<ProtectionLayer>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<MetricsPush>,
    pub verification: Arc<VerificationCodes>,
}

impl Engine {
    pub fn new(adapters: Adapters, config: &Config, default_dns: (IpAddr, IpAddr)) -> Self {
        let tokens = TokenService::new(config);

        let identity = Arc::new(IdentityStore::new(adapters.subscribers.clone(), adapters.clock.clone()));
        let entitlement = Arc::new(EntitlementEngine::new(
            adapters.subscribers.clone(),
            adapters.subscriptions.clone(),
            adapters.plans.clone(),
            adapters.payments.clone(),
            adapters.clock.clone(),
        ));
        let server_registry = Arc::new(ServerRegistry::new(adapters.servers.clone()));
        let protection = Arc::new(ProtectionLayer::new(adapters.kv.clone(), config.clone()));
        let sessions = Arc::new(SessionManager::new(
            adapters.sessions.clone(),
            adapters.servers.clone(),
            adapters.usage_logs.clone(),
            server_registry.clone(),
            identity.clone(),
            entitlement.clone(),
            adapters.clock.clone(),
            default_dns,
        ));
        let metrics = Arc::new(MetricsPush::new(
            adapters.sessions.clone(),
            adapters.servers.clone(),
            server_registry.clone(),
            adapters.clock.clone(),
        ));
        let verification = Arc::new(VerificationCodes::new(
            adapters.verification_codes.clone(),
            adapters.email.clone(),
            adapters.clock.clone(),
            config.otp_ttl_minutes,
        ));

        Self {
            tokens,
            identity,
            entitlement,
            server_registry,
            protection,
            sessions,
            metrics,
            verification,
        }
    }
}
