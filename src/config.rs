//! Protocol constants and runtime configuration
use std::{env, net::Ipv4Addr, str::FromStr, time::Duration};

/// Port every Kasa device listens on, for both TCP and UDP.
pub const DEFAULT_PORT: u16 = 9999;

/// Connect, read and write timeout for a single TCP request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Replies are read in a single call of at most this many bytes.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Fixed broadcast targets, tried after any interface-derived ones.
pub const BROADCAST_TARGETS: [Ipv4Addr; 8] = [
    Ipv4Addr::BROADCAST,
    Ipv4Addr::new(192, 168, 1, 255),
    Ipv4Addr::new(192, 168, 0, 255),
    Ipv4Addr::new(192, 168, 255, 255),
    Ipv4Addr::new(10, 0, 255, 255),
    Ipv4Addr::new(10, 255, 255, 255),
    Ipv4Addr::new(172, 16, 255, 255),
    Ipv4Addr::new(100, 64, 255, 255),
];

/// Datagrams of this many bytes or fewer are treated as our own echoed query.
///
/// The query frame is 33 bytes and real sysinfo replies run to several
/// hundred, but a device answering with a short body would be dropped here.
pub const ECHO_THRESHOLD: usize = 50;

pub const SEND_ROUNDS: usize = 5;
pub const SEND_PACING: Duration = Duration::from_millis(200);
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

pub const SCAN_WORKERS: usize = 50;
pub const SCAN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub request_timeout: Duration,
    pub discovery_timeout: Duration,
    pub scan_timeout: Duration,
    /// Add broadcasts derived from local interfaces to the discovery targets.
    pub interface_broadcasts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            request_timeout: REQUEST_TIMEOUT,
            discovery_timeout: DISCOVERY_TIMEOUT,
            scan_timeout: SCAN_TIMEOUT,
            interface_broadcasts: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            port: parse_or(&lookup, "KASA_PORT", defaults.port)?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "KASA_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            discovery_timeout: Duration::from_secs(parse_or(
                &lookup,
                "KASA_DISCOVERY_TIMEOUT_SECS",
                defaults.discovery_timeout.as_secs(),
            )?),
            scan_timeout: Duration::from_millis(parse_or(
                &lookup,
                "KASA_SCAN_TIMEOUT_MS",
                defaults.scan_timeout.as_millis() as u64,
            )?),
            interface_broadcasts: parse_or(
                &lookup,
                "KASA_INTERFACE_BROADCASTS",
                defaults.interface_broadcasts,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("KASA_PORT must be > 0".into());
        }
        if self.request_timeout == Duration::from_secs(0) {
            return Err("KASA_TIMEOUT_SECS must be > 0".into());
        }
        if self.scan_timeout == Duration::from_secs(0) {
            return Err("KASA_SCAN_TIMEOUT_MS must be > 0".into());
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(Config::default(), config);
        assert_eq!(9999, config.port);
        assert_eq!(Duration::from_secs(5), config.request_timeout);
    }

    #[test]
    fn overrides_from_environment() {
        let config = Config::from_lookup(lookup(&[
            ("KASA_PORT", "10000"),
            ("KASA_TIMEOUT_SECS", "2"),
            ("KASA_DISCOVERY_TIMEOUT_SECS", "10"),
            ("KASA_INTERFACE_BROADCASTS", "false"),
        ]))
        .unwrap();

        assert_eq!(10000, config.port);
        assert_eq!(Duration::from_secs(2), config.request_timeout);
        assert_eq!(Duration::from_secs(10), config.discovery_timeout);
        assert!(!config.interface_broadcasts);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("KASA_PORT", "nope")])).is_err());
        assert!(Config::from_lookup(lookup(&[("KASA_PORT", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("KASA_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn echo_threshold_sits_between_query_and_reply() {
        let query = r#"{"system":{"get_sysinfo":{}}}"#.len() + 4;
        assert!(query <= ECHO_THRESHOLD);
    }
}
