//! Fabric Coordinator
//!
//! A coordinator tracks every server of every high-availability group and
//! can report which one is the writable primary.

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Row};

use crate::config::FabricConfig;
use crate::discovery::probe::int_column;
use crate::error::{Error, Result};

/// Server status reported for the group primary
pub const STATUS_PRIMARY: i64 = 3;

/// Server mode reported for a member accepting reads and writes
pub const MODE_READ_WRITE: i64 = 3;

/// One row of the coordinator's server dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricServer {
    pub server_uuid: String,
    pub group_id: String,
    pub host: String,
    pub port: Option<u16>,
    pub mode: i64,
    pub status: i64,
}

impl FabricServer {
    pub fn is_active_primary(&self) -> bool {
        self.status == STATUS_PRIMARY && self.mode == MODE_READ_WRITE
    }

    /// Address in the form used by the replica registry
    pub fn address(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

/// Source of group membership and roles
#[async_trait::async_trait]
pub trait FabricCoordinator: Send + Sync {
    /// Coordinator address, for diagnostics
    fn address(&self) -> &str;

    async fn servers(&self) -> Result<Vec<FabricServer>>;
}

/// Coordinator reached over the MySQL protocol with `CALL dump.servers()`
#[derive(Debug, Clone)]
pub struct MariaDbFabricCoordinator {
    config: FabricConfig,
    timeout: std::time::Duration,
}

impl MariaDbFabricCoordinator {
    pub fn new(config: FabricConfig, timeout: std::time::Duration) -> Self {
        Self { config, timeout }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.server)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.database)
    }

    fn unreachable(&self, reason: impl std::fmt::Display) -> Error {
        Error::CoordinatorUnreachable {
            address: self.config.server.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl FabricCoordinator for MariaDbFabricCoordinator {
    fn address(&self) -> &str {
        &self.config.server
    }

    async fn servers(&self) -> Result<Vec<FabricServer>> {
        let options = self.connect_options();
        let mut conn = tokio::time::timeout(self.timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| self.unreachable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| self.unreachable(e))?;

        let rows = sqlx::query("CALL dump.servers()").fetch_all(&mut conn).await;
        if let Err(e) = conn.close().await {
            tracing::debug!("Closing coordinator connection failed: {}", e);
        }
        let rows = rows.map_err(|e| self.unreachable(e))?;

        let servers: Vec<FabricServer> = rows
            .iter()
            .filter_map(|row| {
                Some(FabricServer {
                    server_uuid: row.try_get("server_uuid").unwrap_or_default(),
                    group_id: row.try_get("group_id").ok()?,
                    host: row.try_get("host").ok()?,
                    port: int_column(row, "port").and_then(|p| u16::try_from(p).ok()),
                    mode: int_column(row, "mode")?,
                    status: int_column(row, "status")?,
                })
            })
            .collect();

        tracing::debug!("Coordinator {} reported {} servers", self.config.server, servers.len());
        Ok(servers)
    }
}
