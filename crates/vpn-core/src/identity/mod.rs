//! Identity Store: the authoritative record of subscribers, credentials,
//! and verification state.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, TokenService};
use crate::domain::Subscriber;
use crate::error::{AppError, Result};
use crate::ports::{Clock, SubscriberRepo};

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub struct IdentityStore {
    repo: Arc<dyn SubscriberRepo>,
    clock: Arc<dyn Clock>,
}

impl IdentityStore {
    pub fn new(repo: Arc<dyn SubscriberRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        phone: Option<&str>,
        country: Option<&str>,
    ) -> Result<Subscriber> {
        let normalized = Subscriber::normalize_email(email);
        if !is_plausible_email(&normalized) {
            return Err(AppError::InvalidInput("malformed email".into()));
        }
        if password.len() < 8 {
            return Err(AppError::InvalidInput(
                "password must be at least 8 characters".into(),
            ));
        }
        if self.repo.get_by_email(&normalized).await?.is_some() {
            return Err(AppError::AlreadyExists);
        }

        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            handle: rand::random::<u32>() as i64,
            email: normalized,
            password_hash: hash_password(password)?,
            display_name: name.to_string(),
            phone: phone.map(str::to_string),
            country: country.map(str::to_string),
            verified: false,
            active: true,
            premium: false,
            superuser: false,
            created_at: self.clock.now(),
        };

        match self.repo.insert(&subscriber).await {
            Ok(()) => Ok(subscriber),
            Err(e) if matches!(e, crate::error::StoreError::Conflict) => Err(AppError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticates by email/password. Unknown email and bad password both
    /// collapse to `Unauthenticated` so the caller cannot enumerate
    /// registered addresses.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Subscriber> {
        let normalized = Subscriber::normalize_email(email);
        let subscriber = self.repo.get_by_email(&normalized).await?;

        let Some(subscriber) = subscriber else {
            // Still run a hash comparison against a dummy value so the
            // unknown-email and bad-password paths take comparable time.
            let _ = verify_password(password, DUMMY_HASH);
            return Err(AppError::Unauthenticated);
        };

        if !verify_password(password, &subscriber.password_hash) {
            return Err(AppError::Unauthenticated);
        }
        if !subscriber.verified {
            return Err(AppError::Unverified);
        }
        if !subscriber.active {
            return Err(AppError::Disabled);
        }
        Ok(subscriber)
    }

    /// Composes `authenticate` with token issuance for the login flow.
    pub async fn login(&self, email: &str, password: &str, tokens: &TokenService) -> Result<(Subscriber, String)> {
        let subscriber = self.authenticate(email, password).await?;
        let token = tokens.issue(subscriber.id, subscriber.superuser, Utc::now())?;
        Ok((subscriber, token))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Subscriber> {
        self.repo.get_by_id(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn get_by_handle(&self, handle: i64) -> Result<Subscriber> {
        self.repo.get_by_handle(handle).await?.ok_or(AppError::NotFound)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Subscriber> {
        let normalized = Subscriber::normalize_email(email);
        self.repo.get_by_email(&normalized).await?.ok_or(AppError::NotFound)
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        phone: Option<&str>,
        country: Option<&str>,
    ) -> Result<()> {
        self.repo.update_profile(id, display_name, phone, country).await?;
        Ok(())
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        active: Option<bool>,
        premium: Option<bool>,
        superuser: Option<bool>,
    ) -> Result<()> {
        self.repo.update_status(id, active, premium, superuser).await?;
        Ok(())
    }

    pub async fn set_password(&self, id: Uuid, new_password: &str) -> Result<()> {
        if new_password.len() < 8 {
            return Err(AppError::InvalidInput(
                "password must be at least 8 characters".into(),
            ));
        }
        let hash = hash_password(new_password)?;
        self.repo.set_password(id, &hash).await?;
        Ok(())
    }

    /// Marks the subscriber verified. Called after `VerificationCodes`
    /// reports `VerifyOutcome::Ok` for an `email_verify` code; kept as a
    /// distinct operation rather than folded into `update_status` since
    /// it's a one-way transition driven by a different component.
    pub async fn mark_verified(&self, id: Uuid) -> Result<()> {
        self.repo.mark_verified(id).await?;
        Ok(())
    }
}

/// A precomputed Argon2 hash of a fixed dummy string, compared against on
/// the unknown-email path so its latency resembles a real verification and
/// doesn't leak account existence via timing.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$PGdK1/Z3TnCqZ5NdymkBqeK9hO6vWqzFwEI2ySvK1P0";
