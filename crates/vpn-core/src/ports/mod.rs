//! Trait boundaries the engine depends on but does not implement in
//! production form. Each is satisfied by `vpn-core-memory`'s in-process
//! reference adapter for tests and local development; a real deployment
//! swaps in a relational/kv/SMTP/payment adapter crate that is out of
//! scope for this core.

mod clock;
mod email;
mod kv;
mod payment_gateway;
pub mod repos;

pub use clock::Clock;
pub use email::EmailTransport;
pub use kv::{BanRecord, KvStore};
pub use payment_gateway::PaymentGateway;
pub use repos::{
    PaymentRepo, PlanRepo, ServerRepo, SessionRepo, SubscriberRepo, SubscriptionRepo,
    UsageLogRepo, VerificationCodeRepo,
};
