use async_trait::async_trait;
use uuid::Uuid;

/// The external payment processor. Out of scope beyond this thin
/// collaborator boundary: the core only needs to know whether a charge was
/// initiated and, later, whether the provider's callback confirms it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates a charge for `amount` against `method`, returning the
    /// provider's external reference for later reconciliation.
    async fn charge(&self, payment_id: Uuid, amount: i64, method: &str) -> anyhow::Result<String>;
}
