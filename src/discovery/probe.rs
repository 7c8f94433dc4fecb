//! Read-only Probe
//!
//! Asks a single member whether it currently accepts writes.

use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Connection, Row};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::executor::MariaDbConnector;
use crate::replica::ReplicaMember;

/// Reports whether a member is writable
#[async_trait::async_trait]
pub trait ReplicaProbe: Send + Sync {
    async fn is_writable(&self, member: &ReplicaMember) -> Result<bool>;
}

/// Probe using `SELECT @@read_only` on a short-lived connection
#[derive(Debug, Clone)]
pub struct MariaDbProbe {
    config: DatabaseConfig,
}

impl MariaDbProbe {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ReplicaProbe for MariaDbProbe {
    async fn is_writable(&self, member: &ReplicaMember) -> Result<bool> {
        let options = MariaDbConnector::connect_options(&self.config, member);
        let timeout = std::time::Duration::from_secs(self.config.connect_timeout_secs);

        let mut conn = match tokio::time::timeout(timeout, MySqlConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailed {
                    address: member.host_address.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::ConnectionFailed {
                    address: member.host_address.clone(),
                    reason: format!("timed out after {:?}", timeout),
                })
            }
        };

        let row = sqlx::query("SELECT @@read_only").fetch_one(&mut conn).await;
        if let Err(e) = conn.close().await {
            tracing::debug!("Closing probe connection to {} failed: {}", member, e);
        }

        let read_only = int_column(&row?, 0).ok_or_else(|| {
            Error::Internal(format!("@@read_only from {} is not an integer", member))
        })?;
        tracing::debug!("@@read_only={} on {}", read_only, member);

        // @@read_only=0 means the member is writable
        Ok(read_only == 0)
    }
}

/// Read an integer column that servers report with varying wire types
pub(crate) fn int_column<I>(row: &MySqlRow, index: I) -> Option<i64>
where
    I: sqlx::ColumnIndex<MySqlRow> + Copy,
{
    row.try_get::<i64, _>(index)
        .ok()
        .or_else(|| row.try_get::<u64, _>(index).ok().and_then(|v| i64::try_from(v).ok()))
        .or_else(|| row.try_get::<i32, _>(index).ok().map(i64::from))
        .or_else(|| row.try_get::<i8, _>(index).ok().map(i64::from))
        .or_else(|| {
            row.try_get::<String, _>(index)
                .ok()
                .and_then(|s| s.trim().parse().ok())
        })
}
