use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authoritative record of a subscriber: credentials, verification state,
/// and a cached premium bit reconciled lazily from the Entitlement Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    /// Short numeric handle exposed to external collaborators (mobile app,
    /// operator UI); distinct from the opaque internal `id`.
    pub handle: i64,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub verified: bool,
    pub active: bool,
    /// Cache of EE's current decision. MUST be reconciled on subscription
    /// change; see `EntitlementEngine::resolve`.
    pub premium: bool,
    pub superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    /// Normalizes an email the way the Identity Store requires: lowercase,
    /// trimmed. Storage and lookups both go through this so uniqueness is
    /// effectively case-insensitive.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}
