//! Entitlement Engine: resolves a subscriber's currently effective plan and
//! tier, and drives the subscription/payment lifecycle.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{
    Payment, PaymentMethod, PaymentStatus, Subscription, SubscriptionStatus, Tier,
};
use crate::error::{AppError, Result};
use crate::ports::{Clock, PaymentRepo, PlanRepo, SubscriberRepo, SubscriptionRepo};

/// EE's decision for a subscriber at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Entitlement {
    pub tier: Tier,
    pub active: bool,
    pub plan_id: Option<Uuid>,
    pub expiry: Option<chrono::DateTime<Utc>>,
}

impl Entitlement {
    fn free() -> Self {
        Self { tier: Tier::Free, active: false, plan_id: None, expiry: None }
    }
}

pub struct EntitlementEngine {
    subscribers: Arc<dyn SubscriberRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    plans: Arc<dyn PlanRepo>,
    payments: Arc<dyn PaymentRepo>,
    clock: Arc<dyn Clock>,
}

impl EntitlementEngine {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        plans: Arc<dyn PlanRepo>,
        payments: Arc<dyn PaymentRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { subscribers, subscriptions, plans, payments, clock }
    }

    /// Resolves the subscriber's currently effective plan. Select the most
    /// recent subscription; if it is active and not yet expired, the
    /// entitlement is that plan's tier; otherwise free. The subscriber's
    /// cached `premium` flag is reconciled against this decision in the
    /// same call — this is the one place in the system that writes it.
    #[instrument(skip(self))]
    pub async fn resolve(&self, subscriber_id: Uuid) -> Result<Entitlement> {
        let now = self.clock.now();
        let latest = self.subscriptions.get_latest_for_subscriber(subscriber_id).await?;

        let entitlement = match latest {
            Some(sub) if sub.is_effective(now) => {
                let plan = self.plans.get(sub.plan_id).await?.ok_or(AppError::Internal)?;
                Entitlement {
                    tier: plan.tier,
                    active: true,
                    plan_id: Some(plan.id),
                    expiry: Some(sub.end_time),
                }
            }
            _ => Entitlement::free(),
        };

        let computed_premium = entitlement.tier == Tier::Paid;
        if let Some(subscriber) = self.subscribers.get_by_id(subscriber_id).await? {
            if subscriber.premium != computed_premium {
                self.subscribers
                    .update_status(subscriber_id, None, Some(computed_premium), None)
                    .await?;
            }
        }

        Ok(entitlement)
    }

    /// Creates a pending subscription and a pending payment. For a
    /// zero-priced plan, the payment confirmation callback is synthesized
    /// immediately (there is nothing external to wait for).
    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        subscriber_id: Uuid,
        plan_id: Uuid,
        auto_renew: bool,
        method: PaymentMethod,
    ) -> Result<Subscription> {
        let plan = self.plans.get(plan_id).await?.ok_or(AppError::NotFound)?;
        if !plan.assignable() {
            return Err(AppError::InvalidInput("plan is retired".into()));
        }

        let now = self.clock.now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            subscriber_id,
            plan_id,
            // Placeholder bounds until `confirm_payment` activates the
            // subscription; `end_time > start_time` still holds via the
            // one-second placeholder span.
            start_time: now,
            end_time: now + Duration::seconds(1),
            status: SubscriptionStatus::Pending,
            auto_renew,
        };
        self.subscriptions.insert(&subscription).await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            subscriber_id,
            subscription_id: subscription.id,
            amount: plan.price,
            method,
            status: PaymentStatus::Pending,
            external_reference: None,
        };
        self.payments.insert(&payment).await?;

        if plan.is_free() {
            self.confirm_payment(payment.id, true).await?;
        }

        Ok(subscription)
    }

    /// Payment-provider webhook callback. On success, activates the
    /// referenced subscription: `start_time = now`,
    /// `end_time = now + plan.duration`.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, payment_id: Uuid, succeeded: bool) -> Result<()> {
        let payment = self.payments.get(payment_id).await?.ok_or(AppError::NotFound)?;
        if !succeeded {
            self.payments.set_status(payment_id, PaymentStatus::Failed).await?;
            return Err(AppError::PaymentFailed);
        }
        self.payments.set_status(payment_id, PaymentStatus::Success).await?;

        let subscription = self
            .subscriptions
            .get(payment.subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let plan = self.plans.get(subscription.plan_id).await?.ok_or(AppError::Internal)?;

        let now = self.clock.now();
        let end_time = now + Duration::days(plan.duration_days);
        self.subscriptions.activate(subscription.id, now, end_time).await?;
        Ok(())
    }

    /// Sets `auto_renew = false` but preserves access until `end_time`;
    /// the subscription only becomes `canceled` once it actually expires
    /// (the reconcile path, not this call, transitions the status).
    #[instrument(skip(self))]
    pub async fn cancel(&self, subscription_id: Uuid) -> Result<()> {
        self.subscriptions.set_auto_renew(subscription_id, false).await?;
        Ok(())
    }

    /// Walks every `Active` subscription and moves the ones whose
    /// `end_time` has passed to `Expired` (or `Canceled` if `auto_renew`
    /// was already turned off), matching the Session Manager's and Server
    /// Registry's own reconcile passes. Returns the number transitioned.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut transitioned = 0u64;

        for subscription in self.subscriptions.list_active().await? {
            if subscription.end_time > now {
                continue;
            }
            let next = if subscription.auto_renew {
                SubscriptionStatus::Expired
            } else {
                SubscriptionStatus::Canceled
            };
            if !subscription.status.can_transition_to(next) {
                continue;
            }
            self.subscriptions.set_status(subscription.id, next).await?;
            transitioned += 1;
        }

        Ok(transitioned)
    }
}
