//! Configuration management for ln-rebalancer
//!
//! Configuration is loaded from TOML files.
//!
//! # Example Configuration File
//!
//! ```toml
//! [node]
//! host = "127.0.0.1"
//! port = 8080
//! tls_certificate = "/home/lnd/.lnd/tls.cert"
//! macaroon_file = "/home/lnd/.lnd/data/chain/bitcoin/mainnet/admin.macaroon"
//!
//! [rebalance]
//! min_minor_version = 9
//! active_only = true
//! payment_timeout_seconds = 60
//!
//! [api]
//! bind_address = "0.0.0.0:3000"
//! rate_limit_per_minute = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node REST connection configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Rebalance workflow configuration
    #[serde(default)]
    pub rebalance: RebalanceConfig,

    /// Notification feed configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// API server configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node REST connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node REST host address
    #[serde(default = "default_node_host")]
    pub host: String,

    /// Node REST port
    #[serde(default = "default_node_port")]
    pub port: u16,

    /// Path to the node's TLS certificate (PEM)
    pub tls_certificate: Option<PathBuf>,

    /// Path to a macaroon file; binary files are hex-encoded before use
    pub macaroon_file: Option<PathBuf>,

    /// Hex-encoded macaroon, used when no macaroon file is configured
    pub macaroon: Option<String>,

    /// Accept self-signed certificates that are not pinned via `tls_certificate`
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Request timeout in seconds for non-payment calls
    #[serde(default = "default_connection_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_node_host(),
            port: default_node_port(),
            tls_certificate: None,
            macaroon_file: None,
            macaroon: None,
            accept_invalid_certs: false,
            timeout_seconds: default_connection_timeout(),
        }
    }
}

fn default_node_host() -> String {
    "127.0.0.1".to_string()
}

fn default_node_port() -> u16 {
    8080 // Default LND REST port
}

fn default_connection_timeout() -> u64 {
    30
}

/// Rebalance workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Lowest node minor version (0.x) that supports rebalancing
    #[serde(default = "default_min_minor_version")]
    pub min_minor_version: u32,

    /// Only list active channels as candidates
    #[serde(default = "default_true")]
    pub active_only: bool,

    /// How long the node may search for a route, in seconds
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_seconds: u64,

    /// Memo attached to the self-invoice
    #[serde(default = "default_invoice_memo")]
    pub invoice_memo: String,

    /// Expiry of the self-invoice, in seconds
    #[serde(default = "default_invoice_expiry")]
    pub invoice_expiry_seconds: u64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_minor_version: default_min_minor_version(),
            active_only: true,
            payment_timeout_seconds: default_payment_timeout(),
            invoice_memo: default_invoice_memo(),
            invoice_expiry_seconds: default_invoice_expiry(),
        }
    }
}

fn default_min_minor_version() -> u32 {
    9 // 0.9.0-beta
}

fn default_payment_timeout() -> u64 {
    60
}

fn default_invoice_memo() -> String {
    "Rebalance".to_string()
}

fn default_invoice_expiry() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

/// Notification feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Number of recent notifications kept for polling clients
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Capacity of the broadcast channel for live subscribers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_history_size() -> usize {
    50
}

fn default_channel_capacity() -> usize {
    100
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server to
    #[serde(default = "default_api_bind")]
    pub bind_address: String,

    /// API request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Requests per minute allowed per client and route
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
            timeout_seconds: default_api_timeout(),
            enable_cors: true,
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

fn default_api_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_rate_limit() -> u32 {
    60 // 60 requests per minute
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Get the API bind address
    pub fn api_bind_address(&self) -> String {
        self.api.bind_address.clone()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.node.port == 0 {
            return Err("Node port cannot be 0".to_string());
        }

        if self.node.macaroon.is_some() && self.node.macaroon_file.is_some() {
            return Err("Configure either node.macaroon or node.macaroon_file, not both".to_string());
        }

        if self.rebalance.payment_timeout_seconds == 0 {
            return Err("Payment timeout must be at least one second".to_string());
        }

        if self.api.rate_limit_per_minute == 0 {
            return Err("API rate limit must allow at least one request per minute".to_string());
        }

        if self.notifications.history_size == 0 || self.notifications.channel_capacity == 0 {
            return Err("Notification history and channel capacity must be non-zero".to_string());
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            ));
        }

        Ok(())
    }
}

impl NodeConfig {
    /// REST base URL of the node
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}
