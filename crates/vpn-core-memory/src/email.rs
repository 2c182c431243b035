//! A captured-message email transport: logs and stores every send rather
//! than dispatching anywhere, so tests can assert on the code that would
//! have been delivered.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use vpn_core::ports::EmailTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEmail {
    pub to: String,
    pub code: String,
    pub kind: &'static str,
}

#[derive(Default)]
pub struct CapturingEmailTransport {
    sent: Mutex<Vec<CapturedEmail>>,
}

impl CapturingEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<CapturedEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailTransport for CapturingEmailTransport {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> anyhow::Result<()> {
        info!(to = to_email, "sending verification code");
        self.sent.lock().await.push(CapturedEmail {
            to: to_email.to_string(),
            code: code.to_string(),
            kind: "verification",
        });
        Ok(())
    }

    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> anyhow::Result<()> {
        info!(to = to_email, "sending password reset code");
        self.sent.lock().await.push(CapturedEmail {
            to: to_email.to_string(),
            code: code.to_string(),
            kind: "password_reset",
        });
        Ok(())
    }
}
