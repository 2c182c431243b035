//! Verification / Reset Codes: six-digit one-time codes gating email
//! verification and password reset.

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use subtle::ConstantTimeEq;
use tracing::instrument;

use crate::domain::{Subscriber, VerificationCode, VerificationPurpose};
use crate::error::{AppError, Result};
use crate::ports::{Clock, EmailTransport, VerificationCodeRepo};

const MAX_ATTEMPTS: u8 = 3;

/// Outcome of a `verify` call; distinct from `AppError` because a wrong or
/// expired code is an expected, user-facing outcome rather than an
/// operational failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Expired,
    Bad,
}

pub struct VerificationCodes {
    repo: Arc<dyn VerificationCodeRepo>,
    email: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl VerificationCodes {
    pub fn new(
        repo: Arc<dyn VerificationCodeRepo>,
        email: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        ttl_minutes: i64,
    ) -> Self {
        Self { repo, email, clock, ttl: Duration::minutes(ttl_minutes) }
    }

    /// Invalidates any prior unconsumed code for `(email, purpose)`,
    /// issues a fresh six-digit code, and hands it to the email
    /// collaborator. Email delivery failure is logged and surfaced to the
    /// caller as `DependencyDown`; the code itself is already persisted,
    /// so a resend attempt reuses it rather than re-minting.
    #[instrument(skip(self, subscriber))]
    pub async fn issue(&self, subscriber: &Subscriber, purpose: VerificationPurpose) -> Result<()> {
        let now = self.clock.now();
        let code = generate_code();
        let record = VerificationCode {
            email: subscriber.email.clone(),
            purpose,
            code,
            expires_at: now + self.ttl,
            consumed: false,
            attempts: 0,
        };
        self.repo.issue(&record).await?;

        let sent = match purpose {
            VerificationPurpose::EmailVerify => {
                self.email.send_verification_code(&subscriber.email, &record.code).await
            }
            VerificationPurpose::PasswordReset => {
                self.email.send_password_reset_code(&subscriber.email, &record.code).await
            }
        };
        if let Err(error) = sent {
            tracing::warn!(%error, "verification email delivery failed");
            return Err(AppError::DependencyDown);
        }
        Ok(())
    }

    /// Checks expiry, compares in constant time, and marks the code
    /// consumed on match. A third failed attempt invalidates the code
    /// outright so further attempts see `Bad` rather than being able to
    /// keep guessing against it.
    #[instrument(skip(self, submitted))]
    pub async fn verify(
        &self,
        email: &str,
        purpose: VerificationPurpose,
        submitted: &str,
    ) -> Result<VerifyOutcome> {
        let normalized = Subscriber::normalize_email(email);
        let Some(record) = self.repo.get_unconsumed(&normalized, purpose).await? else {
            return Ok(VerifyOutcome::Bad);
        };

        let now = self.clock.now();
        if record.is_expired(now) {
            self.repo.invalidate(&normalized, purpose).await?;
            return Ok(VerifyOutcome::Expired);
        }

        if codes_match(&record.code, submitted) {
            self.repo.mark_consumed(&normalized, purpose).await?;
            return Ok(VerifyOutcome::Ok);
        }

        let attempts = self.repo.record_failed_attempt(&normalized, purpose).await?;
        if attempts >= MAX_ATTEMPTS {
            self.repo.invalidate(&normalized, purpose).await?;
        }
        Ok(VerifyOutcome::Bad)
    }
}

fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}

/// Constant-time comparison so a timing side channel can't narrow down the
/// correct code digit by digit. Differing lengths short-circuit to
/// unequal without comparing content, which is safe here since code
/// length (six digits) is not secret.
fn codes_match(expected: &str, submitted: &str) -> bool {
    if expected.len() != submitted.len() {
        return false;
    }
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn codes_match_is_constant_time_on_length() {
        assert!(codes_match("123456", "123456"));
        assert!(!codes_match("123456", "654321"));
        assert!(!codes_match("123456", "12345"));
    }
}
