//! Configuration management for the data MCP server
//!
//! All options come from environment variables with built-in defaults;
//! nothing here is required for the server to start.

use crate::error::Result;

/// Default User-Agent for web requests (a common desktop browser).
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Server configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level directive for the tracing subscriber
    pub log_level: String,

    /// Maximum connections per database pool
    pub db_pool_size: u32,

    /// Minimum idle connections per database pool
    pub db_pool_min_idle: u32,

    /// Pool acquire timeout in milliseconds
    pub db_connection_timeout_ms: u64,

    /// Pool idle timeout in milliseconds
    pub db_idle_timeout_ms: u64,

    /// Pool connection max lifetime in milliseconds
    pub db_max_lifetime_ms: u64,

    /// Leak detection threshold in milliseconds (accepted, not enforced)
    pub db_leak_detection_ms: u64,

    /// HTTP connect timeout in milliseconds
    pub web_connection_timeout_ms: u64,

    /// HTTP read timeout in milliseconds
    pub web_read_timeout_ms: u64,

    /// Maximum fetched page size in bytes
    pub web_max_page_size_bytes: u64,

    /// User-Agent header for web requests
    pub web_user_agent: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn new() -> Result<Self> {
        Ok(Self {
            log_level: env_string("MCP_LOG_LEVEL", "info"),
            db_pool_size: env_parse("MCP_DB_POOL_SIZE", 10),
            db_pool_min_idle: env_parse("MCP_DB_POOL_MIN_IDLE", 2),
            db_connection_timeout_ms: env_parse("MCP_DB_CONNECTION_TIMEOUT_MS", 30_000),
            db_idle_timeout_ms: env_parse("MCP_DB_IDLE_TIMEOUT_MS", 600_000),
            db_max_lifetime_ms: env_parse("MCP_DB_MAX_LIFETIME_MS", 1_800_000),
            db_leak_detection_ms: env_parse("MCP_DB_LEAK_DETECTION_MS", 60_000),
            web_connection_timeout_ms: env_parse("MCP_WEB_CONNECTION_TIMEOUT_MS", 10_000),
            web_read_timeout_ms: env_parse("MCP_WEB_READ_TIMEOUT_MS", 10_000),
            web_max_page_size_bytes: env_parse("MCP_WEB_MAX_PAGE_SIZE_BYTES", 5_000_000),
            web_user_agent: env_string("MCP_WEB_USER_AGENT", DEFAULT_USER_AGENT),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default config")
    }
}

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(var: &str, default: T) -> T {
    match std::env::var(var) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var, value = %raw, "Ignoring unparsable environment override");
            default
        }),
        Err(_) => default,
    }
}
