//! Typed configuration assembled from environment variables. Loading is
//! explicit (`Config::from_env`) rather than a
//! global `lazy_static`, so tests can build a `Config` by hand.

use std::collections::HashMap;
use std::time::Duration;

use crate::protection::EndpointClass;

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window_secs: i64,
    pub burst_allowance: u32,
}

impl RateLimitPolicy {
    pub fn cap(&self) -> u32 {
        self.limit + self.burst_allowance
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub jwt_algorithm: jsonwebtoken::Algorithm,
    pub access_token_ttl_minutes: i64,

    pub database_url: String,
    pub kv_url: String,

    pub allowed_origins: Vec<String>,
    pub allowed_hosts: Vec<String>,

    pub rate_limit_enabled: bool,
    pub ddos_protection_enabled: bool,
    pub global_rate_limit_per_min: u32,
    pub ip_rate_limit_per_min: u32,
    pub endpoint_policies: HashMap<EndpointClass, RateLimitPolicy>,

    pub ddos_threshold: u32,
    pub ddos_ban_duration_secs: i64,
    pub ddos_whitelist: Vec<String>,

    pub suspicious_threshold: u32,
    pub suspicious_window_secs: i64,
    pub suspicious_ban_duration_secs: i64,

    pub otp_ttl_minutes: i64,
    pub metrics_push_interval: Duration,
    pub session_stale_threshold_secs: i64,

    pub payment_provider_secret: String,
    pub payment_webhook_secret: String,
}

/// Errors while assembling [`Config`] from the environment: a required
/// variable missing, or one present but unparsable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

fn env_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    /// Loads configuration from the process environment, applying the
    /// documented defaults for every tunable except the two mandatory
    /// secrets.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret =
            std::env::var("jwt_secret").map_err(|_| ConfigError::Missing("jwt_secret"))?;
        let payment_provider_secret = std::env::var("payment_provider_secret")
            .map_err(|_| ConfigError::Missing("payment_provider_secret"))?;
        let payment_webhook_secret = std::env::var("payment_webhook_secret")
            .map_err(|_| ConfigError::Missing("payment_webhook_secret"))?;

        let jwt_algorithm = match env_default("jwt_algorithm", "HS256").as_str() {
            "HS256" => jsonwebtoken::Algorithm::HS256,
            "HS384" => jsonwebtoken::Algorithm::HS384,
            "HS512" => jsonwebtoken::Algorithm::HS512,
            other => {
                return Err(ConfigError::Invalid {
                    name: "jwt_algorithm",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            jwt_secret,
            jwt_algorithm,
            access_token_ttl_minutes: env_parse("access_token_ttl_minutes", 30)?,
            database_url: env_default("database_url", ""),
            kv_url: env_default("kv_url", ""),
            allowed_origins: env_list("allowed_origins"),
            allowed_hosts: env_list("allowed_hosts"),
            rate_limit_enabled: env_parse("rate_limit_enabled", true)?,
            ddos_protection_enabled: env_parse("ddos_protection_enabled", true)?,
            global_rate_limit_per_min: env_parse("global_rate_limit", 1000)?,
            ip_rate_limit_per_min: env_parse("ip_rate_limit", 100)?,
            endpoint_policies: default_endpoint_policies(),
            ddos_threshold: env_parse("ddos_threshold", 500)?,
            ddos_ban_duration_secs: env_parse("ddos_ban_duration_seconds", 3600)?,
            ddos_whitelist: env_list("ddos_whitelist"),
            suspicious_threshold: env_parse("suspicious_threshold", 50)?,
            suspicious_window_secs: env_parse("suspicious_window_seconds", 300)?,
            suspicious_ban_duration_secs: env_parse("suspicious_ban_duration_seconds", 1800)?,
            otp_ttl_minutes: env_parse("otp_ttl_minutes", 10)?,
            metrics_push_interval: Duration::from_secs(env_parse(
                "metrics_push_interval_seconds",
                1,
            )?),
            session_stale_threshold_secs: env_parse("session_stale_threshold_seconds", 600)?,
            payment_provider_secret,
            payment_webhook_secret,
        })
    }

    /// A configuration suitable for tests: fixed secrets, all defaults.
    pub fn test_default() -> Self {
        Self {
            jwt_secret: "test-secret".into(),
            jwt_algorithm: jsonwebtoken::Algorithm::HS256,
            access_token_ttl_minutes: 30,
            database_url: String::new(),
            kv_url: String::new(),
            allowed_origins: vec![],
            allowed_hosts: vec![],
            rate_limit_enabled: true,
            ddos_protection_enabled: true,
            global_rate_limit_per_min: 1000,
            ip_rate_limit_per_min: 100,
            endpoint_policies: default_endpoint_policies(),
            ddos_threshold: 500,
            ddos_ban_duration_secs: 3600,
            ddos_whitelist: vec![],
            suspicious_threshold: 50,
            suspicious_window_secs: 300,
            suspicious_ban_duration_secs: 1800,
            otp_ttl_minutes: 10,
            metrics_push_interval: Duration::from_secs(1),
            session_stale_threshold_secs: 600,
            payment_provider_secret: "test-provider-secret".into(),
            payment_webhook_secret: "test-webhook-secret".into(),
        }
    }
}

fn default_endpoint_policies() -> HashMap<EndpointClass, RateLimitPolicy> {
    use EndpointClass::*;
    HashMap::from([
        (
            AuthLogin,
            RateLimitPolicy { limit: 5, window_secs: 300, burst_allowance: 2 },
        ),
        (
            AuthRegister,
            RateLimitPolicy { limit: 3, window_secs: 3600, burst_allowance: 1 },
        ),
        (
            AuthPasswordReset,
            RateLimitPolicy { limit: 3, window_secs: 3600, burst_allowance: 1 },
        ),
        (
            VpnConnect,
            RateLimitPolicy { limit: 20, window_secs: 60, burst_allowance: 5 },
        ),
        (
            VpnDisconnect,
            RateLimitPolicy { limit: 30, window_secs: 60, burst_allowance: 10 },
        ),
        (
            Payments,
            RateLimitPolicy { limit: 10, window_secs: 300, burst_allowance: 3 },
        ),
        (
            Websocket,
            RateLimitPolicy { limit: 5, window_secs: 60, burst_allowance: 2 },
        ),
        (
            General,
            RateLimitPolicy { limit: 60, window_secs: 60, burst_allowance: 20 },
        ),
    ])
}
