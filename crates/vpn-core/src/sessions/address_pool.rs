//! In-tunnel address allocation: picks the first host address within the
//! server's tunnel subnet that isn't currently leased.

use std::net::{IpAddr, Ipv4Addr};

use crate::domain::Server;
use crate::error::{AppError, Result};

/// Scans the server's `/prefix_len` subnet (skipping the network address,
/// the server's own tunnel address, and the broadcast address) for the
/// first address not present in `leased`.
pub fn allocate_client_address(server: &Server, leased: &[IpAddr]) -> Result<IpAddr> {
    let IpAddr::V4(base) = server.tunnel_address else {
        // IPv6 tunnel pools are out of scope; every seeded server in this
        // implementation uses an IPv4 tunnel address.
        return Err(AppError::AddressExhausted);
    };
    let prefix_len = server.tunnel_prefix_len;
    if prefix_len == 0 || prefix_len > 32 {
        return Err(AppError::AddressExhausted);
    }

    let host_bits = 32 - prefix_len as u32;
    let host_count: u32 = if host_bits >= 32 { u32::MAX } else { 1u32 << host_bits };
    let mask: u32 = if host_bits >= 32 { 0 } else { !0u32 << host_bits };
    let network = u32::from(base) & mask;

    for offset in 1..host_count.saturating_sub(1) {
        let candidate = Ipv4Addr::from(network | offset);
        let candidate_addr = IpAddr::V4(candidate);
        if candidate_addr == server.tunnel_address {
            continue;
        }
        if !leased.contains(&candidate_addr) {
            return Ok(candidate_addr);
        }
    }

    Err(AppError::AddressExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServerStatus, Tier};
    use uuid::Uuid;

    fn server() -> Server {
        Server {
            id: Uuid::new_v4(),
            hostname: "node-1".into(),
            location: "us-east".into(),
            endpoint_host: "198.51.100.1".into(),
            endpoint_port: 51820,
            public_key: "pubkey".into(),
            tunnel_address: IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1)),
            tunnel_prefix_len: 30,
            routed_prefixes: vec!["0.0.0.0/0".into()],
            tier: Tier::Free,
            status: ServerStatus::Active,
            current_load: 0.0,
            latency_ms: 10,
            max_connections: 1,
        }
    }

    #[test]
    fn allocates_first_free_host_address() {
        let server = server();
        let addr = allocate_client_address(&server, &[]).unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::new(10, 8, 0, 2)));
    }

    #[test]
    fn skips_leased_and_server_addresses() {
        let server = server();
        let leased = vec![IpAddr::V4(Ipv4Addr::new(10, 8, 0, 2))];
        // A /30 has exactly 2 usable host addresses (.1 and .2); with the
        // server at .1 and .2 leased, the pool is exhausted.
        let result = allocate_client_address(&server, &leased);
        assert!(matches!(result, Err(AppError::AddressExhausted)));
    }

    #[test]
    fn exhausted_pool_errors() {
        let mut server = server();
        server.tunnel_prefix_len = 32;
        let result = allocate_client_address(&server, &[]);
        assert!(matches!(result, Err(AppError::AddressExhausted)));
    }
}
