use async_trait::async_trait;

/// The outbound email transport. Treated as best-effort: a failure is
/// logged and surfaced to the user as "try again later", never retried
/// past a single attempt.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> anyhow::Result<()>;
    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> anyhow::Result<()>;
}
