use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationPurpose {
    EmailVerify,
    PasswordReset,
}

/// Short-lived one-time code bound to a purpose. Invariant: at most one
/// unconsumed code per (email, purpose).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCode {
    pub email: String,
    pub purpose: VerificationPurpose,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    /// Failed-comparison attempts against this code; the code is
    /// invalidated after the third.
    pub attempts: u8,
}

impl VerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
