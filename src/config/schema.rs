//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Identifier this device presents to chained servers.
    pub device_id: String,

    /// Chained proxies to balance across, in preference order.
    pub chained_servers: Vec<ChainedServerConfig>,

    /// Local listener configuration.
    pub listener: ListenerConfig,

    /// Balancer timing.
    pub balancer: BalancerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// One chained (CONNECT) proxy server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainedServerConfig {
    /// Server address (e.g., "proxy.example.com:443").
    pub addr: String,

    /// Token presented in the CONNECT request.
    pub auth_token: String,

    /// Relative share of new tunnels this server is tried first for (default: 1).
    pub weight: u32,
}

impl Default for ChainedServerConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            auth_token: String::new(),
            weight: 1,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8787").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8787".to_string(),
            max_connections: 1_000,
        }
    }
}

/// Balancer timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// How long a dial waits for a balancer to be published, in seconds.
    pub acquire_timeout_secs: u64,

    /// Per-attempt dial timeout through one chained server, in seconds.
    pub dial_timeout_secs: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 24 * 60 * 60,
            dial_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
