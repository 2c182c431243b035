use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::str::FromStr;

/// Administrative bypass list: bare IPs or CIDR blocks, matched by prefix
/// containment. Expected to be short (an operator allow-list, not a
/// routing table), so a linear scan is the right tool.
pub struct Whitelist {
    entries: Vec<IpNetwork>,
}

impl Whitelist {
    pub fn parse(raw: &[String]) -> Self {
        let entries = raw
            .iter()
            .filter_map(|entry| {
                IpNetwork::from_str(entry)
                    .or_else(|_| entry.parse::<IpAddr>().map(IpNetwork::from))
                    .inspect_err(|_| tracing::warn!(entry = %entry, "ignoring unparsable whitelist entry"))
                    .ok()
            })
            .collect();
        Self { entries }
    }

    pub fn contains(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return false;
        };
        self.entries.iter().any(|net| net.contains(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_bare_ip_and_cidr() {
        let wl = Whitelist::parse(&["203.0.113.5".to_string(), "198.51.100.0/24".to_string()]);
        assert!(wl.contains("203.0.113.5"));
        assert!(wl.contains("198.51.100.42"));
        assert!(!wl.contains("203.0.113.6"));
    }

    #[test]
    fn ignores_garbage_entries() {
        let wl = Whitelist::parse(&["not-an-ip".to_string()]);
        assert!(!wl.contains("203.0.113.5"));
    }
}
