//! A payment gateway stub that always succeeds immediately, returning a
//! synthetic external reference. The real provider integration is out of
//! scope for this core.

use async_trait::async_trait;
use uuid::Uuid;

use vpn_core::ports::PaymentGateway;

#[derive(Default)]
pub struct StubPaymentGateway;

impl StubPaymentGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for StubPaymentGateway {
    async fn charge(&self, payment_id: Uuid, _amount: i64, _method: &str) -> anyhow::Result<String> {
        Ok(format!("stub-charge-{payment_id}"))
    }
}
