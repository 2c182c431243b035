use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Active,
    Maintenance,
    Offline,
}

/// A tunnel data-plane node. `current_load` is a summary of open sessions,
/// kept close to (but not transactionally coupled with) the session table;
/// the periodic reconcile task in the Server Registry corrects drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    pub hostname: String,
    pub location: String,
    pub endpoint_host: String,
    pub endpoint_port: u16,
    pub public_key: String,
    pub tunnel_address: IpAddr,
    pub tunnel_prefix_len: u8,
    pub routed_prefixes: Vec<String>,
    pub tier: Tier,
    pub status: ServerStatus,
    pub current_load: f64,
    pub latency_ms: u32,
    pub max_connections: u32,
}

impl Server {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.endpoint_host, self.endpoint_port)
    }

    pub fn is_admissible(&self) -> bool {
        self.status == ServerStatus::Active
    }

    /// One session's contribution to `current_load`; used both when
    /// incrementing on admit and decrementing on disconnect.
    pub fn load_step(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            1.0 / self.max_connections as f64
        }
    }

    pub fn clamp_load(load: f64) -> f64 {
        load.clamp(0.0, 1.0)
    }
}
