//! Plain domain entities mirroring the persisted schema. These carry no
//! ORM machinery — that belongs to whichever concrete adapter crate
//! implements the [`crate::ports`] traits.

mod payment;
mod plan;
mod server;
mod session;
mod subscriber;
mod subscription;
mod usage_log;
mod verification_code;

pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use plan::{Plan, PlanStatus};
pub use server::{Server, ServerStatus};
pub use session::{Session, SessionStatus};
pub use subscriber::Subscriber;
pub use subscription::{Subscription, SubscriptionStatus};
pub use usage_log::UsageLog;
pub use verification_code::{VerificationCode, VerificationPurpose};

/// Two-valued access level applied to plans, subscribers (via entitlement)
/// and servers. Selection requires `subscriber_tier >= server_tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    pub fn satisfies(&self, required: Tier) -> bool {
        *self >= required
    }
}
