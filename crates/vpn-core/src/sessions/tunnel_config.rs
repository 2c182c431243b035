//! Renders the client-facing tunnel configuration blob returned by
//! `connect` — a WireGuard-style `[Interface]`/`[Peer]` text
//! format, since that is the wire convention the rest of the control plane
//! was modeled against.

use std::net::IpAddr;

use crate::domain::Server;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub rendered: String,
}

impl TunnelConfig {
    pub fn render(server: &Server, assigned_address: IpAddr, dns: (IpAddr, IpAddr)) -> Self {
        let routed = if server.routed_prefixes.is_empty() {
            "0.0.0.0/0".to_string()
        } else {
            server.routed_prefixes.join(", ")
        };

        let rendered = format!(
            "[Interface]\n\
             Address = {address}/32\n\
             DNS = {dns1}, {dns2}\n\
             \n\
             [Peer]\n\
             PublicKey = {pubkey}\n\
             Endpoint = {endpoint}\n\
             AllowedIPs = {routed}\n\
             PersistentKeepalive = 25\n",
            address = assigned_address,
            dns1 = dns.0,
            dns2 = dns.1,
            pubkey = server.public_key,
            endpoint = server.endpoint(),
            routed = routed,
        );

        Self { rendered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServerStatus, Tier};
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    #[test]
    fn renders_expected_sections() {
        let server = Server {
            id: Uuid::new_v4(),
            hostname: "node-1".into(),
            location: "us-east".into(),
            endpoint_host: "198.51.100.1".into(),
            endpoint_port: 51820,
            public_key: "serverpubkey".into(),
            tunnel_address: IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1)),
            tunnel_prefix_len: 24,
            routed_prefixes: vec!["0.0.0.0/0".into()],
            tier: Tier::Free,
            status: ServerStatus::Active,
            current_load: 0.0,
            latency_ms: 10,
            max_connections: 100,
        };
        let dns = (IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)));
        let config = TunnelConfig::render(&server, IpAddr::V4(Ipv4Addr::new(10, 8, 0, 2)), dns);

        assert!(config.rendered.contains("[Interface]"));
        assert!(config.rendered.contains("Address = 10.8.0.2/32"));
        assert!(config.rendered.contains("PublicKey = serverpubkey"));
        assert!(config.rendered.contains("Endpoint = 198.51.100.1:51820"));
        assert!(config.rendered.contains("PersistentKeepalive = 25"));
    }
}
