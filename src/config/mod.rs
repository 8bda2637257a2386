use crate::models::parse_duration;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

const ENV_PREFIX: &str = "REFLECTOR_";

const DEFAULT_CONCURRENCY: u16 = 4;
const DEFAULT_POLICY_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

/// Controller-wide settings, read once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectorConfig {
    /// Reconciliations in flight per controller
    pub concurrency: u16,
    /// Steady-state requeue for policies and for durable failures
    pub policy_interval: Duration,
    /// Requeue after conflicts and while a referenced repository is not scanned yet
    pub retry_interval: Duration,
    /// Scan deadline for repositories that set no timeout of their own
    pub scan_timeout: Duration,
    pub metrics_addr: SocketAddr,
    /// Only watch this namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            policy_interval: DEFAULT_POLICY_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            metrics_addr: default_metrics_addr(),
            watch_namespace: None,
        }
    }
}

impl ReflectorConfig {
    /// Build the configuration from `REFLECTOR_*` environment variables
    pub fn from_env() -> Self {
        let data: BTreeMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        let config = Self::from_map(&data);

        info!(
            "Loaded configuration: concurrency={}, policy_interval={:?}, retry_interval={:?}, scan_timeout={:?}, metrics_addr={}, watch_namespace={}",
            config.concurrency,
            config.policy_interval,
            config.retry_interval,
            config.scan_timeout,
            config.metrics_addr,
            config.watch_namespace.as_deref().unwrap_or("<all>")
        );

        config
    }

    /// Build the configuration from key/value pairs; invalid values fall back to defaults
    pub fn from_map(data: &BTreeMap<String, String>) -> Self {
        Self {
            concurrency: parse_concurrency(data, "REFLECTOR_CONCURRENCY", DEFAULT_CONCURRENCY),
            policy_interval: parse_interval(data, "REFLECTOR_POLICY_INTERVAL", DEFAULT_POLICY_INTERVAL),
            retry_interval: parse_interval(data, "REFLECTOR_RETRY_INTERVAL", DEFAULT_RETRY_INTERVAL),
            scan_timeout: parse_interval(data, "REFLECTOR_SCAN_TIMEOUT", DEFAULT_SCAN_TIMEOUT),
            metrics_addr: parse_addr(data, "REFLECTOR_METRICS_ADDR"),
            watch_namespace: parse_optional_string(data, "REFLECTOR_WATCH_NAMESPACE"),
        }
    }
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn parse_concurrency(data: &BTreeMap<String, String>, key: &str, default: u16) -> u16 {
    match data.get(key).map(|v| v.trim().parse::<u16>()) {
        Some(Ok(value)) if value > 0 => value,
        Some(_) => {
            warn!("Invalid value for {}, using default {}", key, default);
            default
        },
        None => default,
    }
}

/// Accepts Go-style durations (`30s`, `5m`) as well as bare seconds
fn parse_interval(data: &BTreeMap<String, String>, key: &str, default: Duration) -> Duration {
    let Some(raw) = data.get(key) else {
        return default;
    };

    let parsed = match raw.trim().parse::<u64>() {
        Ok(seconds) => Ok(Duration::from_secs(seconds)),
        Err(_) => parse_duration(raw),
    };

    match parsed {
        Ok(value) if !value.is_zero() => value,
        _ => {
            warn!(
                "Invalid duration '{}' for {}, using default {:?}",
                raw, key, default
            );
            default
        },
    }
}

fn parse_addr(data: &BTreeMap<String, String>, key: &str) -> SocketAddr {
    match data.get(key).map(|v| v.trim().parse::<SocketAddr>()) {
        Some(Ok(addr)) => addr,
        Some(Err(e)) => {
            warn!(
                "Invalid address for {}: {}, using default {}",
                key, e, DEFAULT_METRICS_ADDR
            );
            default_metrics_addr()
        },
        None => default_metrics_addr(),
    }
}

fn parse_optional_string(data: &BTreeMap<String, String>, key: &str) -> Option<String> {
    data.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}
