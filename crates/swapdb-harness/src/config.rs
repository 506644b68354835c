//! Harness configuration
//!
//! Loaded from `SWAPDB_*` environment variables; everything has a default.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::batch::{BatchConfig, MismatchPolicy};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something that cannot be used
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Which store implementation the harness talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// A redis server at `redis_addr`
    Redis,
    /// A process-local keyspace (no server needed)
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "inmemory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Store implementation
    pub backend: Backend,

    /// Redis address as `host:port`
    pub redis_addr: String,

    /// Logical databases to populate and verify; the first one serves the control surface
    pub databases: Vec<u32>,

    /// Keys per database
    pub key_count: usize,

    /// Batch execution settings
    pub batch: BatchConfig,

    /// Pause between verification passes (zero = yield only)
    pub sampler_interval: Duration,

    /// Key logged by the probe
    pub probe_key: String,

    /// Probe period
    pub probe_interval: Duration,

    /// Control surface listen address
    pub http_addr: SocketAddr,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redis,
            redis_addr: "redis:6379".to_string(),
            databases: vec![0, 1, 2],
            key_count: 1000,
            batch: BatchConfig::default(),
            sampler_interval: Duration::ZERO,
            probe_key: "key:10".to_string(),
            probe_interval: Duration::from_secs(1),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl HarnessConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SWAPDB_BACKEND`: `redis` or `memory` (default: redis)
    /// - `SWAPDB_REDIS_ADDR`: redis `host:port` (default: redis:6379)
    /// - `SWAPDB_DATABASES`: comma-separated database indices (default: 0,1,2)
    /// - `SWAPDB_KEY_COUNT`: keys per database (default: 1000)
    /// - `SWAPDB_MAX_CONCURRENCY`: in-flight operations per batch (default: 10)
    /// - `SWAPDB_OP_TIMEOUT_MS`: deadline per store call (default: 5000)
    /// - `SWAPDB_ACQUIRE_TIMEOUT_MS`: deadline for a concurrency permit (default: 30000)
    /// - `SWAPDB_STRICT_VERIFY`: fail verification on mismatches (default: false)
    /// - `SWAPDB_SAMPLER_INTERVAL_MS`: pause between verification passes (default: 0)
    /// - `SWAPDB_PROBE_KEY`: key logged by the probe (default: key:10)
    /// - `SWAPDB_PROBE_INTERVAL_MS`: probe period (default: 1000)
    /// - `SWAPDB_HTTP_ADDR`: control surface address (default: 0.0.0.0:8080)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let databases = match lookup("SWAPDB_DATABASES") {
            Some(raw) => parse_databases(&raw)?,
            None => defaults.databases,
        };

        let strict = lookup("SWAPDB_STRICT_VERIFY")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let batch = BatchConfig::new()
            .with_max_concurrency(parsed(
                &lookup,
                "SWAPDB_MAX_CONCURRENCY",
                defaults.batch.max_concurrency,
            ))
            .with_op_timeout(millis(&lookup, "SWAPDB_OP_TIMEOUT_MS", defaults.batch.op_timeout))
            .with_acquire_timeout(millis(
                &lookup,
                "SWAPDB_ACQUIRE_TIMEOUT_MS",
                defaults.batch.acquire_timeout,
            ))
            .with_mismatch_policy(if strict {
                MismatchPolicy::Fail
            } else {
                MismatchPolicy::Report
            });

        Ok(Self {
            backend: parsed(&lookup, "SWAPDB_BACKEND", defaults.backend),
            redis_addr: lookup("SWAPDB_REDIS_ADDR").unwrap_or(defaults.redis_addr),
            databases,
            key_count: parsed(&lookup, "SWAPDB_KEY_COUNT", defaults.key_count),
            batch,
            sampler_interval: millis(
                &lookup,
                "SWAPDB_SAMPLER_INTERVAL_MS",
                defaults.sampler_interval,
            ),
            probe_key: lookup("SWAPDB_PROBE_KEY").unwrap_or(defaults.probe_key),
            probe_interval: millis(&lookup, "SWAPDB_PROBE_INTERVAL_MS", defaults.probe_interval),
            http_addr: parsed(&lookup, "SWAPDB_HTTP_ADDR", defaults.http_addr),
        })
    }

    /// Database the control surface and the probe talk through
    pub fn primary_database(&self) -> Option<u32> {
        self.databases.first().copied()
    }
}

fn parse_databases(raw: &str) -> Result<Vec<u32>, ConfigError> {
    let mut databases = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let db = part.parse::<u32>().map_err(|e| ConfigError::Invalid {
            var: "SWAPDB_DATABASES",
            reason: format!("'{}': {}", part, e),
        })?;
        if databases.contains(&db) {
            return Err(ConfigError::Invalid {
                var: "SWAPDB_DATABASES",
                reason: format!("database {} listed twice", db),
            });
        }
        databases.push(db);
    }

    if databases.is_empty() {
        return Err(ConfigError::Invalid {
            var: "SWAPDB_DATABASES",
            reason: "no databases listed".to_string(),
        });
    }

    Ok(databases)
}

/// Parse a variable, falling back to `default` with a warning when unusable
fn parsed<T, F>(lookup: &F, var: &'static str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!(var, value = %raw, ?default, "Ignoring invalid setting: {}", e);
            default
        }),
        None => default,
    }
}

fn millis<F>(lookup: &F, var: &'static str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = default.as_millis() as u64;
    Duration::from_millis(parsed(lookup, var, default_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<HarnessConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarnessConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();

        assert_eq!(config.backend, Backend::Redis);
        assert_eq!(config.redis_addr, "redis:6379");
        assert_eq!(config.databases, vec![0, 1, 2]);
        assert_eq!(config.key_count, 1000);
        assert_eq!(config.batch.max_concurrency, 10);
        assert_eq!(config.batch.mismatch_policy, MismatchPolicy::Report);
        assert_eq!(config.sampler_interval, Duration::ZERO);
        assert_eq!(config.probe_key, "key:10");
        assert_eq!(config.probe_interval, Duration::from_secs(1));
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.primary_database(), Some(0));
    }

    #[test]
    fn test_primary_database_of_hand_built_config() {
        let config = HarnessConfig {
            databases: vec![],
            ..HarnessConfig::default()
        };
        assert_eq!(config.primary_database(), None);

        let config = HarnessConfig {
            databases: vec![5, 1],
            ..HarnessConfig::default()
        };
        assert_eq!(config.primary_database(), Some(5));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("SWAPDB_BACKEND", "memory"),
            ("SWAPDB_REDIS_ADDR", "localhost:6380"),
            ("SWAPDB_DATABASES", "3, 4"),
            ("SWAPDB_KEY_COUNT", "50"),
            ("SWAPDB_MAX_CONCURRENCY", "4"),
            ("SWAPDB_OP_TIMEOUT_MS", "250"),
            ("SWAPDB_STRICT_VERIFY", "true"),
            ("SWAPDB_SAMPLER_INTERVAL_MS", "100"),
            ("SWAPDB_HTTP_ADDR", "127.0.0.1:9090"),
        ])
        .unwrap();

        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.redis_addr, "localhost:6380");
        assert_eq!(config.databases, vec![3, 4]);
        assert_eq!(config.primary_database(), Some(3));
        assert_eq!(config.key_count, 50);
        assert_eq!(config.batch.max_concurrency, 4);
        assert_eq!(config.batch.op_timeout, Duration::from_millis(250));
        assert_eq!(config.batch.mismatch_policy, MismatchPolicy::Fail);
        assert_eq!(config.sampler_interval, Duration::from_millis(100));
        assert_eq!(config.http_addr, "127.0.0.1:9090".parse().unwrap());
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = from_pairs(&[
            ("SWAPDB_KEY_COUNT", "lots"),
            ("SWAPDB_MAX_CONCURRENCY", "0"),
            ("SWAPDB_BACKEND", "etcd"),
        ])
        .unwrap();

        assert_eq!(config.key_count, 1000);
        // Zero parses but is clamped to one permit
        assert_eq!(config.batch.max_concurrency, 1);
        assert_eq!(config.backend, Backend::Redis);
    }

    #[test]
    fn test_invalid_database_list_is_an_error() {
        assert!(matches!(
            from_pairs(&[("SWAPDB_DATABASES", "0,x")]),
            Err(ConfigError::Invalid { var: "SWAPDB_DATABASES", .. })
        ));
        assert!(from_pairs(&[("SWAPDB_DATABASES", "1,1")]).is_err());
        assert!(from_pairs(&[("SWAPDB_DATABASES", " , ")]).is_err());
    }
}
