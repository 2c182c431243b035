//! Integration tests for the numbered invariants that are easier to state
//! against a concrete scenario than to generate arbitrarily: server load
//! reconciliation, the one-unconsumed-code-per-purpose rule, and
//! entitlement expiry.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use uuid::Uuid;

use vpn_core::domain::{
    Payment, PaymentMethod, PaymentStatus, Plan, PlanStatus, Server, ServerStatus, Session,
    Subscription, SubscriptionStatus, Tier, VerificationCode, VerificationPurpose,
};
use vpn_core::entitlement::EntitlementEngine;
use vpn_core::ports::{Clock, PaymentRepo, SessionRepo, SubscriptionRepo, VerificationCodeRepo};
use vpn_core::servers::ServerRegistry;

use vpn_core_memory::{FakeClock, MemoryStore};

fn server(max_connections: u32) -> Server {
    Server {
        id: Uuid::new_v4(),
        hostname: "node-reconcile".into(),
        location: "us-east".into(),
        endpoint_host: "198.51.100.1".into(),
        endpoint_port: 51820,
        public_key: "pubkey".into(),
        tunnel_address: IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1)),
        tunnel_prefix_len: 24,
        routed_prefixes: vec!["0.0.0.0/0".into()],
        tier: Tier::Free,
        status: ServerStatus::Active,
        current_load: 0.9, // deliberately wrong, to be corrected by reconcile
        latency_ms: 10,
        max_connections,
    }
}

/// Invariant 2: after `reconcile`, current_load equals the counted
/// connected-session ratio, not whatever `adjust_load` drift left behind.
#[tokio::test]
async fn reconcile_corrects_load_to_match_connected_sessions() {
    let store = Arc::new(MemoryStore::new());
    let server = server(4);
    store.seed_server(server.clone()).await;

    let now = chrono::Utc::now();
    for _ in 0..2 {
        let session = Session::open(
            Uuid::new_v4(),
            Uuid::new_v4(),
            server.id,
            IpAddr::V4(Ipv4Addr::new(10, 8, 0, 2)),
            "clientkey".into(),
            now,
        );
        store.try_open(&session).await.unwrap();
    }

    let registry = ServerRegistry::new(store.clone());
    registry.reconcile().await.unwrap();

    let refreshed = registry.get(server.id).await.unwrap();
    assert!((refreshed.current_load - 0.5).abs() < 1e-9, "load was {}", refreshed.current_load);
    assert!(refreshed.current_load >= 0.0 && refreshed.current_load <= 1.0);
}

/// Invariant 3: issuing a new code for the same (email, purpose) replaces
/// rather than accumulates; at most one unconsumed code ever exists.
#[tokio::test]
async fn at_most_one_unconsumed_code_per_email_and_purpose() {
    let store = MemoryStore::new();
    let email = "a@x.test";
    let now = chrono::Utc::now();

    let first = VerificationCode {
        email: email.into(),
        purpose: VerificationPurpose::EmailVerify,
        code: "111111".into(),
        expires_at: now + chrono::Duration::minutes(10),
        consumed: false,
        attempts: 0,
    };
    store.issue(&first).await.unwrap();
    assert_eq!(
        store.get_unconsumed(email, VerificationPurpose::EmailVerify).await.unwrap().unwrap().code,
        "111111"
    );

    let second = VerificationCode { code: "222222".into(), ..first.clone() };
    store.issue(&second).await.unwrap();

    let unconsumed = store.get_unconsumed(email, VerificationPurpose::EmailVerify).await.unwrap();
    assert_eq!(unconsumed.map(|c| c.code), Some("222222".into()));

    store.mark_consumed(email, VerificationPurpose::EmailVerify).await.unwrap();
    assert!(store.get_unconsumed(email, VerificationPurpose::EmailVerify).await.unwrap().is_none());
}

fn plan(tier: Tier, duration_days: i64) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        display_name: "test plan".into(),
        tier,
        price: 500,
        duration_days,
        features: Default::default(),
        status: PlanStatus::Active,
    }
}

/// Invariant 9: once `end_time` is in the past, EE treats the subscriber
/// as free even though the subscription row is still nominally `active`.
#[tokio::test]
async fn expired_subscription_resolves_to_free_tier() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FakeClock::new(chrono::Utc::now()));

    let subscriber = vpn_core::domain::Subscriber {
        id: Uuid::new_v4(),
        handle: 1,
        email: "paid@x.test".into(),
        password_hash: "irrelevant".into(),
        display_name: "Paid".into(),
        phone: None,
        country: None,
        verified: true,
        active: true,
        premium: true,
        superuser: false,
        created_at: clock.now(),
    };
    vpn_core::ports::SubscriberRepo::insert(store.as_ref(), &subscriber).await.unwrap();

    let plan = plan(Tier::Paid, 30);
    store.seed_plan(plan.clone()).await;

    let subscription = vpn_core::domain::Subscription {
        id: Uuid::new_v4(),
        subscriber_id: subscriber.id,
        plan_id: plan.id,
        start_time: clock.now() - chrono::Duration::days(31),
        end_time: clock.now() - chrono::Duration::days(1),
        status: vpn_core::domain::SubscriptionStatus::Active,
        auto_renew: false,
    };
    SubscriptionRepo::insert(store.as_ref(), &subscription).await.unwrap();

    let payment = Payment {
        id: Uuid::new_v4(),
        subscriber_id: subscriber.id,
        subscription_id: subscription.id,
        amount: plan.price,
        method: PaymentMethod::Card,
        status: PaymentStatus::Success,
        external_reference: None,
    };
    PaymentRepo::insert(store.as_ref(), &payment).await.unwrap();

    let engine = EntitlementEngine::new(store.clone(), store.clone(), store.clone(), store.clone(), clock.clone());
    let entitlement = engine.resolve(subscriber.id).await.unwrap();

    assert_eq!(entitlement.tier, Tier::Free);
    assert!(!entitlement.active);

    let reconciled = vpn_core::ports::SubscriberRepo::get_by_id(store.as_ref(), subscriber.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!reconciled.premium, "EE should have reconciled the cached premium flag down to false");
}

fn expired_subscription(subscriber_id: Uuid, plan_id: Uuid, clock: &FakeClock, auto_renew: bool) -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        subscriber_id,
        plan_id,
        start_time: clock.now() - chrono::Duration::days(31),
        end_time: clock.now() - chrono::Duration::days(1),
        status: SubscriptionStatus::Active,
        auto_renew,
    }
}

/// EE's `reconcile` transitions past-expiry `Active` rows to `Expired` (if
/// still auto-renewing) or `Canceled` (if auto-renew was already turned
/// off), and leaves not-yet-expired rows alone.
#[tokio::test]
async fn reconcile_transitions_expired_subscriptions_by_auto_renew() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
    let plan = plan(Tier::Paid, 30);
    store.seed_plan(plan.clone()).await;

    let renewing = expired_subscription(Uuid::new_v4(), plan.id, &clock, true);
    let canceled = expired_subscription(Uuid::new_v4(), plan.id, &clock, false);
    let still_active = Subscription {
        id: Uuid::new_v4(),
        subscriber_id: Uuid::new_v4(),
        plan_id: plan.id,
        start_time: clock.now(),
        end_time: clock.now() + chrono::Duration::days(30),
        status: SubscriptionStatus::Active,
        auto_renew: true,
    };
    for subscription in [&renewing, &canceled, &still_active] {
        SubscriptionRepo::insert(store.as_ref(), subscription).await.unwrap();
    }

    let engine = EntitlementEngine::new(store.clone(), store.clone(), store.clone(), store.clone(), clock.clone());
    let transitioned = engine.reconcile().await.unwrap();
    assert_eq!(transitioned, 2);

    let renewing_after = SubscriptionRepo::get(store.as_ref(), renewing.id).await.unwrap().unwrap();
    assert_eq!(renewing_after.status, SubscriptionStatus::Expired);

    let canceled_after = SubscriptionRepo::get(store.as_ref(), canceled.id).await.unwrap().unwrap();
    assert_eq!(canceled_after.status, SubscriptionStatus::Canceled);

    let still_active_after = SubscriptionRepo::get(store.as_ref(), still_active.id).await.unwrap().unwrap();
    assert_eq!(still_active_after.status, SubscriptionStatus::Active);

    // Idempotent: a second pass finds nothing left to transition.
    assert_eq!(engine.reconcile().await.unwrap(), 0);
}
