//! MariaDB Executor
//!
//! Pooled connections to one MariaDB/MySQL member and the reload statements
//! run against it.

use std::time::Duration;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::executor::{Connector, ReloadConnection};
use crate::reload::{Field, ReloadStep, Row, TableSchema};
use crate::replica::ReplicaMember;

/// Builds pools for whichever member is currently the leader
#[derive(Debug, Clone)]
pub struct MariaDbConnector {
    config: DatabaseConfig,
    insert_batch_size: usize,
}

impl MariaDbConnector {
    pub fn new(config: DatabaseConfig, insert_batch_size: usize) -> Self {
        Self {
            config,
            insert_batch_size: insert_batch_size.max(1),
        }
    }

    /// Connect options for `member` using the shared credentials
    pub fn connect_options(config: &DatabaseConfig, member: &ReplicaMember) -> MySqlConnectOptions {
        let (host, port) = member.endpoint(config.port);
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&config.user)
            .password(&config.password);

        match &config.name {
            Some(db) => options.database(db),
            None => options,
        }
    }
}

#[async_trait::async_trait]
impl Connector for MariaDbConnector {
    type Connection = MariaDbConnection;

    async fn connect(&self, member: &ReplicaMember) -> Result<MariaDbConnection> {
        tracing::debug!("Opening pool to {}", member);

        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.pool_size)
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect_with(Self::connect_options(&self.config, member))
            .await
            .map_err(|e| Error::ConnectionFailed {
                address: member.host_address.clone(),
                reason: e.to_string(),
            })?;

        Ok(MariaDbConnection {
            member: member.clone(),
            pool,
            tx: None,
            insert_batch_size: self.insert_batch_size,
        })
    }
}

/// Connection pool bound to one member, with at most one open transaction
pub struct MariaDbConnection {
    member: ReplicaMember,
    pool: MySqlPool,
    tx: Option<Transaction<'static, MySql>>,
    insert_batch_size: usize,
}

impl MariaDbConnection {
    fn open_tx(&mut self, step: ReloadStep) -> Result<&mut Transaction<'static, MySql>> {
        let host = &self.member.host_address;
        self.tx
            .as_mut()
            .ok_or_else(|| Error::transaction(step, host, "no open transaction"))
    }
}

#[async_trait::async_trait]
impl ReloadConnection for MariaDbConnection {
    fn member(&self) -> &ReplicaMember {
        &self.member
    }

    async fn ping(&mut self) -> Result<()> {
        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::ConnectionFailed {
                address: self.member.host_address.clone(),
                reason: e.to_string(),
            })?;

        if result.0 != 1 {
            return Err(Error::Internal(format!("unexpected ping reply {}", result.0)));
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::transaction(
                ReloadStep::Begin,
                &self.member.host_address,
                "transaction already open",
            ));
        }

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::transaction(ReloadStep::Begin, &self.member.host_address, e))?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn delete_all(&mut self, table: &TableSchema) -> Result<u64> {
        let sql = format!("DELETE FROM `{}`", table.name);
        let host = self.member.host_address.clone();
        let tx = self.open_tx(ReloadStep::Delete)?;

        let result = sqlx::query(&sql)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::transaction(ReloadStep::Delete, &host, e))?;

        Ok(result.rows_affected())
    }

    async fn insert_rows(&mut self, table: &TableSchema, rows: &[Row]) -> Result<u64> {
        let host = self.member.host_address.clone();
        let batch_size = self.insert_batch_size;
        let tx = self.open_tx(ReloadStep::Insert)?;
        let mut inserted = 0;

        // Bound parameters per statement are capped by the server, so large
        // datasets go out as several multi-row INSERTs in the same transaction.
        for chunk in rows.chunks(batch_size) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
                "INSERT INTO `{}` ({}) ",
                table.name,
                table.column_list()
            ));

            builder.push_values(chunk, |mut values, row| {
                for field in row {
                    match field {
                        Field::Null => values.push_bind(None::<String>),
                        Field::Text(s) => values.push_bind(s.clone()),
                        Field::Integer(i) => values.push_bind(*i),
                    };
                }
            });

            let result = builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| Error::transaction(ReloadStep::Insert, &host, e))?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<()> {
        let host = self.member.host_address.clone();
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::transaction(ReloadStep::Commit, &host, "no open transaction"))?;

        tx.commit()
            .await
            .map_err(|e| Error::transaction(ReloadStep::Commit, &host, e))
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| Error::transaction(ReloadStep::Rollback, &self.member.host_address, e)),
            None => Ok(()),
        }
    }
}
