use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Created by `assign`, awaiting `confirm_payment`. Not one of the base
    /// specification's three statuses — added per the DESIGN.md decision
    /// on the "pending subscription" open question; never counted as the
    /// subscriber's effective entitlement.
    Pending,
    Active,
    Expired,
    Canceled,
}

impl SubscriptionStatus {
    /// Status transitions are monotone: pending -> active; active ->
    /// {canceled, expired}. Terminal states never transition back.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        matches!(
            (self, next),
            (SubscriptionStatus::Pending, SubscriptionStatus::Active)
                | (SubscriptionStatus::Active, SubscriptionStatus::Canceled)
                | (SubscriptionStatus::Active, SubscriptionStatus::Expired)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub plan_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub auto_renew: bool,
}

impl Subscription {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_time > now
    }
}
