//! Server Registry: the pool of tunnel data-plane nodes, their load, and
//! the selection algorithm the Session Manager consults.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Server, ServerStatus, Tier};
use crate::error::{AppError, Result};
use crate::ports::repos::ServerFilter;
use crate::ports::ServerRepo;

pub struct ServerRegistry {
    repo: Arc<dyn ServerRepo>,
}

impl ServerRegistry {
    pub fn new(repo: Arc<dyn ServerRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, filter: &ServerFilter) -> Result<Vec<Server>> {
        Ok(self.repo.list(filter).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Server> {
        self.repo.get(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn create(&self, server: &Server) -> Result<()> {
        self.repo.insert(server).await?;
        Ok(())
    }

    pub async fn update(&self, server: &Server) -> Result<()> {
        self.repo.update(server).await?;
        Ok(())
    }

    /// Deletes the server if nothing references it; otherwise marks it
    /// offline so existing sessions remain resolvable.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if self.repo.has_session_references(id).await? {
            let mut server = self.repo.get(id).await?.ok_or(AppError::NotFound)?;
            server.status = ServerStatus::Offline;
            self.repo.update(&server).await?;
        } else {
            self.repo.delete(id).await?;
        }
        Ok(())
    }

    pub async fn adjust_load(&self, id: Uuid, delta: f64) -> Result<f64> {
        Ok(self.repo.adjust_load(id, delta).await?)
    }

    /// Recomputes `current_load` from the counted active session set for
    /// every server, correcting any drift the non-transactional
    /// `adjust_load` calls may have accumulated. Intended to run on a
    /// periodic interval (see `SessionManager::reconcile` for the matching
    /// session-side sweep).
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<()> {
        let servers = self.repo.list(&ServerFilter::default()).await?;
        for server in servers {
            let connected = self.repo.count_connected_sessions(server.id).await?;
            let load = if server.max_connections == 0 {
                0.0
            } else {
                Server::clamp_load(connected as f64 / server.max_connections as f64)
            };
            if (load - server.current_load).abs() > f64::EPSILON {
                self.repo.set_load(server.id, load).await?;
            }
        }
        Ok(())
    }

    /// The selection algorithm: active, tier-eligible servers,
    /// filtered by location with a fallback to the unfiltered set, filtered
    /// again by free capacity, then ordered
    /// (load, ping, id) ascending for a deterministic tie-break.
    #[instrument(skip(self))]
    pub async fn select(&self, caller_tier: Tier, location: Option<&str>) -> Result<Server> {
        let filter = ServerFilter {
            tier_at_most: Some(caller_tier),
            location: None,
            status: Some(ServerStatus::Active),
        };
        let candidates = self.repo.list(&filter).await?;
        if candidates.is_empty() {
            return Err(AppError::NoCapacity);
        }

        let scoped: Vec<&Server> = match location {
            Some(loc) => {
                let matching: Vec<&Server> = candidates.iter().filter(|s| s.location == loc).collect();
                if matching.is_empty() {
                    candidates.iter().collect()
                } else {
                    matching
                }
            }
            None => candidates.iter().collect(),
        };

        let mut with_capacity = Vec::with_capacity(scoped.len());
        for server in scoped {
            let connected = self.repo.count_connected_sessions(server.id).await?;
            if connected < server.max_connections as u64 {
                with_capacity.push(server.clone());
            }
        }

        with_capacity.sort_by(|a, b| {
            a.current_load
                .partial_cmp(&b.current_load)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.latency_ms.cmp(&b.latency_ms))
                .then(a.id.cmp(&b.id))
        });

        with_capacity.into_iter().next().ok_or(AppError::NoCapacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn server(id: Uuid, location: &str, tier: Tier, load: f64, ping: u32) -> Server {
        Server {
            id,
            hostname: format!("node-{id}"),
            location: location.to_string(),
            endpoint_host: "198.51.100.1".into(),
            endpoint_port: 51820,
            public_key: "pubkey".into(),
            tunnel_address: IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1)),
            tunnel_prefix_len: 24,
            routed_prefixes: vec!["0.0.0.0/0".into()],
            tier,
            status: ServerStatus::Active,
            current_load: load,
            latency_ms: ping,
            max_connections: 100,
        }
    }

    #[test]
    fn tie_break_is_deterministic() {
        let a = server(Uuid::from_u128(1), "us-east", Tier::Free, 0.1, 10);
        let b = server(Uuid::from_u128(2), "us-east", Tier::Free, 0.1, 10);
        let mut servers = vec![b.clone(), a.clone()];
        servers.sort_by(|x, y| {
            x.current_load
                .partial_cmp(&y.current_load)
                .unwrap()
                .then(x.latency_ms.cmp(&y.latency_ms))
                .then(x.id.cmp(&y.id))
        });
        assert_eq!(servers[0].id, a.id);
    }
}
