//! In-memory reference adapters satisfying every `vpn_core::ports` trait.
//! Intended for tests and local development; a production deployment
//! swaps these for relational/kv/SMTP/payment-provider adapters.

mod clock;
mod email;
mod kv;
mod payment_gateway;
mod store;

pub use clock::FakeClock;
pub use email::{CapturedEmail, CapturingEmailTransport};
pub use kv::MemoryKv;
pub use payment_gateway::StubPaymentGateway;
pub use store::MemoryStore;
