//! Signaling router configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may
//! carry credentials and is redacted in Debug output.

use crate::discovery::{Node, StaticNodeDirectory};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Default deadline for relay calls that gate a client action.
pub const DEFAULT_RELAY_CALL_TIMEOUT_MS: u64 = 1000;

/// Default connect timeout for new node channels.
pub const DEFAULT_RPC_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default period of the registry gauge refresh.
pub const DEFAULT_GAUGE_REFRESH_SECONDS: u64 = 15;

/// Default period of the node channel pruning pass.
pub const DEFAULT_CHANNEL_PRUNE_SECONDS: u64 = 60;

/// Default node ID prefix.
pub const DEFAULT_NODE_ID_PREFIX: &str = "signal";

/// Where node discovery comes from.
#[derive(Clone)]
pub enum DiscoveryConfig {
    /// Shared cluster view in Redis.
    Redis(SecretString),
    /// Fixed node list.
    Static(Vec<Node>),
}

impl fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryConfig::Redis(_) => f.debug_tuple("Redis").field(&"[REDACTED]").finish(),
            DiscoveryConfig::Static(nodes) => f.debug_tuple("Static").field(nodes).finish(),
        }
    }
}

/// Signaling router configuration.
#[derive(Clone)]
pub struct Config {
    /// Discovery backend (`REDIS_URL` wins over `SIGNAL_STATIC_NODES`).
    pub discovery: DiscoveryConfig,

    /// Health and metrics bind address (default: "0.0.0.0:8082").
    pub health_bind_address: String,

    /// Unique identifier for this instance.
    pub node_id: String,

    /// Deadline for unpublish/subscribe/unsubscribe and on-leave calls.
    pub relay_call_timeout: Duration,

    /// Connect timeout for node channels.
    pub rpc_connect_timeout: Duration,

    /// Period of the registry gauge refresh.
    pub gauge_refresh_interval: Duration,

    /// How often channels to nodes that left discovery are dropped.
    pub channel_prune_interval: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discovery", &self.discovery)
            .field("health_bind_address", &self.health_bind_address)
            .field("node_id", &self.node_id)
            .field("relay_call_timeout", &self.relay_call_timeout)
            .field("rpc_connect_timeout", &self.rpc_connect_timeout)
            .field("gauge_refresh_interval", &self.gauge_refresh_interval)
            .field("channel_prune_interval", &self.channel_prune_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let discovery = match (vars.get("REDIS_URL"), vars.get("SIGNAL_STATIC_NODES")) {
            (Some(url), _) => DiscoveryConfig::Redis(SecretString::from(url.clone())),
            (None, Some(list)) => {
                let nodes = StaticNodeDirectory::parse_node_list(list)
                    .map_err(|e| ConfigError::InvalidValue(format!("SIGNAL_STATIC_NODES: {e}")))?;
                if nodes.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "SIGNAL_STATIC_NODES lists no nodes".to_string(),
                    ));
                }
                DiscoveryConfig::Static(nodes)
            }
            (None, None) => {
                return Err(ConfigError::MissingEnvVar(
                    "REDIS_URL or SIGNAL_STATIC_NODES".to_string(),
                ))
            }
        };

        let health_bind_address = vars
            .get("SIGNAL_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let relay_call_timeout = Duration::from_millis(parse_or(
            vars,
            "SIGNAL_RELAY_CALL_TIMEOUT_MS",
            DEFAULT_RELAY_CALL_TIMEOUT_MS,
        )?);
        let rpc_connect_timeout = Duration::from_millis(parse_or(
            vars,
            "SIGNAL_RPC_CONNECT_TIMEOUT_MS",
            DEFAULT_RPC_CONNECT_TIMEOUT_MS,
        )?);
        let gauge_refresh_interval = Duration::from_secs(parse_or(
            vars,
            "SIGNAL_GAUGE_REFRESH_SECONDS",
            DEFAULT_GAUGE_REFRESH_SECONDS,
        )?);
        let channel_prune_interval = Duration::from_secs(parse_or(
            vars,
            "SIGNAL_CHANNEL_PRUNE_SECONDS",
            DEFAULT_CHANNEL_PRUNE_SECONDS,
        )?);
        if relay_call_timeout.is_zero()
            || gauge_refresh_interval.is_zero()
            || channel_prune_interval.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "timeouts and intervals must be positive".to_string(),
            ));
        }

        let node_id = vars.get("SIGNAL_NODE_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_NODE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            discovery,
            health_bind_address,
            node_id,
            relay_call_timeout,
            rpc_connect_timeout,
            gauge_refresh_interval,
            channel_prune_interval,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn static_vars() -> HashMap<String, String> {
        HashMap::from([(
            "SIGNAL_STATIC_NODES".to_string(),
            "media-relay:sfu-1=http://sfu-1:50051,directory:islb-1=http://islb:50051".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_static_with_defaults() {
        let config = Config::from_vars(&static_vars()).unwrap();

        match &config.discovery {
            DiscoveryConfig::Static(nodes) => assert_eq!(nodes.len(), 2),
            DiscoveryConfig::Redis(_) => unreachable!("no REDIS_URL given"),
        }
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.relay_call_timeout, Duration::from_millis(1000));
        assert_eq!(config.rpc_connect_timeout, Duration::from_millis(5000));
        assert_eq!(config.gauge_refresh_interval, Duration::from_secs(15));
        assert_eq!(config.channel_prune_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_redis_url_takes_precedence() {
        let mut vars = static_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:hunter2@redis:6379".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        match &config.discovery {
            DiscoveryConfig::Redis(url) => {
                assert_eq!(url.expose_secret(), "redis://:hunter2@redis:6379");
            }
            DiscoveryConfig::Static(_) => unreachable!("REDIS_URL given"),
        }
    }

    #[test]
    fn test_custom_values() {
        let mut vars = static_vars();
        vars.insert("SIGNAL_NODE_ID".to_string(), "signal-a".to_string());
        vars.insert(
            "SIGNAL_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9000".to_string(),
        );
        vars.insert("SIGNAL_RELAY_CALL_TIMEOUT_MS".to_string(), "250".to_string());
        vars.insert("SIGNAL_RPC_CONNECT_TIMEOUT_MS".to_string(), "800".to_string());
        vars.insert("SIGNAL_CHANNEL_PRUNE_SECONDS".to_string(), "5".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.node_id, "signal-a");
        assert_eq!(config.health_bind_address, "127.0.0.1:9000");
        assert_eq!(config.relay_call_timeout, Duration::from_millis(250));
        assert_eq!(config.rpc_connect_timeout, Duration::from_millis(800));
        assert_eq!(config.channel_prune_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_generated_node_id() {
        let mut vars = static_vars();
        vars.insert("HOSTNAME".to_string(), "pod-7".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert!(config.node_id.starts_with("signal-pod-7-"));
        assert_eq!(config.node_id.len(), "signal-pod-7-".len() + 8);
    }

    #[test]
    fn test_missing_discovery() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_malformed_static_nodes() {
        let vars = HashMap::from([(
            "SIGNAL_STATIC_NODES".to_string(),
            "media-relay-sfu-1".to_string(),
        )]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let vars = HashMap::from([("SIGNAL_STATIC_NODES".to_string(), " , ".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_timeout() {
        let mut vars = static_vars();
        vars.insert("SIGNAL_RELAY_CALL_TIMEOUT_MS".to_string(), "soon".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut vars = static_vars();
        vars.insert("SIGNAL_RELAY_CALL_TIMEOUT_MS".to_string(), "0".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let vars = HashMap::from([(
            "REDIS_URL".to_string(),
            "redis://:hunter2@redis:6379".to_string(),
        )]);
        let config = Config::from_vars(&vars).unwrap();

        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }
}
