use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use crate::error::AppError;

/// Hashes `password` with Argon2id and a fresh random salt. The default
/// parameters (~19 MiB memory, 2 passes) land comfortably above the ≥100ms
/// work-factor floor for interactive login on commodity hardware.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            AppError::Internal
        })
}

/// Verifies `password` against a stored hash. Never distinguishes a
/// malformed/unparsable hash from a genuine mismatch to the caller; both
/// collapse to `false` so `authenticate` can present a single
/// `Unauthenticated`.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
