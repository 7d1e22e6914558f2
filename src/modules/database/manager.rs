//! Database connection manager
//!
//! Owns a concurrent map of `connectionId → pool` over heterogeneous SQL
//! backends, plus process-lifetime query/error counters. Pools are sized and
//! validated at connect time; a failed validation never leaves a
//! half-initialised entry behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

use crate::config::Config;
use crate::error::{DataMcpError, DomainError, NotFoundError, ResourceError, Result};
use crate::modules::database::config::DatabaseConfig;

/// Liveness probe bound applied to the first connection of a new pool
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

static INSTALL_DRIVERS: Once = Once::new();

/// Pool sizing derived from server configuration
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_size: config.db_pool_size,
            min_idle: config.db_pool_min_idle,
            acquire_timeout: Duration::from_millis(config.db_connection_timeout_ms),
            idle_timeout: Duration::from_millis(config.db_idle_timeout_ms),
            max_lifetime: Duration::from_millis(config.db_max_lifetime_ms),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 2,
            acquire_timeout: Duration::from_millis(30_000),
            idle_timeout: Duration::from_millis(600_000),
            max_lifetime: Duration::from_millis(1_800_000),
        }
    }
}

pub(crate) struct ConnectionEntry {
    pub config: DatabaseConfig,
    pub pool: AnyPool,
}

/// Per-pool metrics snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    pub active_connections: u32,
    pub idle_connections: usize,
    pub total_connections: u32,
}

/// Manager-wide metrics snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerMetrics {
    pub total_queries: u64,
    pub total_errors: u64,
    pub active_connections: usize,
    pub connections: std::collections::BTreeMap<String, PoolMetrics>,
}

pub struct ConnectionManager {
    connections: DashMap<String, ConnectionEntry>,
    settings: PoolSettings,
    total_queries: AtomicU64,
    total_errors: AtomicU64,
}

impl ConnectionManager {
    pub fn new(settings: PoolSettings) -> Self {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
        Self {
            connections: DashMap::new(),
            settings,
            total_queries: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    /// Open a pool for `connection_id` and validate it with a bounded
    /// liveness probe. Fails if the id already exists; a validation failure
    /// closes the pool before returning.
    pub async fn connect(&self, connection_id: &str, config: DatabaseConfig) -> Result<()> {
        if self.connections.contains_key(connection_id) {
            return Err(DataMcpError::Domain(DomainError::ConnectionExists {
                connection_id: connection_id.to_string(),
            }));
        }

        // A second in-memory SQLite connection would see a different
        // database, so those pools are capped at one connection.
        let (max_size, min_idle) = if config.is_memory_sqlite() {
            (1, 1)
        } else {
            (self.settings.max_size, self.settings.min_idle)
        };

        let pool = AnyPoolOptions::new()
            .max_connections(max_size)
            .min_connections(min_idle)
            .acquire_timeout(self.settings.acquire_timeout)
            .idle_timeout(self.settings.idle_timeout)
            .max_lifetime(self.settings.max_lifetime)
            .connect_lazy(&config.connection_url())?;

        if let Err(err) = self.validate_pool(&pool).await {
            pool.close().await;
            return Err(err);
        }

        let inserted = match self.connections.entry(connection_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(ConnectionEntry {
                    config: config.clone(),
                    pool: pool.clone(),
                });
                true
            }
        };

        if !inserted {
            pool.close().await;
            return Err(DataMcpError::Domain(DomainError::ConnectionExists {
                connection_id: connection_id.to_string(),
            }));
        }

        info!(
            connection_id,
            db_type = config.db_type(),
            pool_size = max_size,
            "Database connection established"
        );
        Ok(())
    }

    async fn validate_pool(&self, pool: &AnyPool) -> Result<()> {
        match tokio::time::timeout(VALIDATION_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(DataMcpError::Resource(ResourceError::ValidationFailed)),
        }
    }

    /// Remove the entry and close its pool. Idempotent on missing ids.
    pub async fn disconnect(&self, connection_id: &str) {
        match self.connections.remove(connection_id) {
            Some((_, entry)) => {
                entry.pool.close().await;
                info!(connection_id, "Database connection closed");
            }
            None => {
                tracing::debug!(connection_id, "Disconnect for unknown connection ignored");
            }
        }
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Configuration and pool for an id, failing on unknown ids and closed pools.
    pub(crate) fn entry(&self, connection_id: &str) -> Result<(DatabaseConfig, AnyPool)> {
        let entry = self.connections.get(connection_id).ok_or_else(|| {
            DataMcpError::NotFound(NotFoundError::Connection {
                connection_id: connection_id.to_string(),
            })
        })?;

        if entry.pool.is_closed() {
            return Err(DataMcpError::Resource(ResourceError::PoolClosed {
                connection_id: connection_id.to_string(),
            }));
        }

        Ok((entry.config.clone(), entry.pool.clone()))
    }

    pub(crate) fn count_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot process-lifetime counters and per-pool statistics.
    pub fn metrics(&self) -> ManagerMetrics {
        let mut connections = std::collections::BTreeMap::new();
        for entry in self.connections.iter() {
            let pool = &entry.value().pool;
            let total = pool.size();
            let idle = pool.num_idle();
            connections.insert(
                entry.key().clone(),
                PoolMetrics {
                    active_connections: total.saturating_sub(idle as u32),
                    idle_connections: idle,
                    total_connections: total,
                },
            );
        }

        ManagerMetrics {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            active_connections: self.connections.len(),
            connections,
        }
    }

    /// Close every pool and clear the map.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.connections.remove(&id) {
                entry.pool.close().await;
            }
        }
        info!("Connection manager shutdown complete");
    }
}
