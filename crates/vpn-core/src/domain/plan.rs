use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Retired,
}

/// A subscription plan. Retired plans remain referenceable by historical
/// subscriptions but cannot be newly assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub display_name: String,
    pub tier: Tier,
    /// Price in the smallest currency unit (e.g. cents); zero means free.
    pub price: i64,
    pub duration_days: i64,
    pub features: BTreeMap<String, String>,
    pub status: PlanStatus,
}

impl Plan {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }

    pub fn assignable(&self) -> bool {
        self.status == PlanStatus::Active
    }
}
