//! Structured logging setup. Call [`init`] once at process start; every
//! core operation below instruments its own span (`connect`, `disconnect`,
//! `authenticate`, rate-limit checks) so a single request's log lines carry
//! consistent fields.

use tracing_subscriber::{EnvFilter, fmt};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}

/// Strips control characters and caps length on an attacker-controlled IP
/// string before it is attached to a log line or span, so a crafted value
/// can't forge extra log lines or blow up span field size.
pub fn sanitize_ip(raw: &str) -> String {
    const MAX_LEN: usize = 64;
    raw.chars()
        .filter(|c| !c.is_control())
        .take(MAX_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_chars_and_caps_length() {
        let dirty = format!("1.2.3.4\r\nSet-Cookie: evil{}", "x".repeat(100));
        let clean = sanitize_ip(&dirty);
        assert!(!clean.contains('\r'));
        assert!(!clean.contains('\n'));
        assert!(clean.len() <= 64);
    }
}
