use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only accounting record, opened on connect and closed on
/// disconnect. Never mutated outside of that one close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub server_id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub data_mb: Option<f64>,
}
