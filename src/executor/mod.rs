//! Database Executor Module
//!
//! Connections to a single replica member and the statements the bulk
//! replace needs from them.

mod mariadb;
#[cfg(test)]
pub(crate) mod memory;

pub use mariadb::{MariaDbConnection, MariaDbConnector};

use crate::error::Result;
use crate::reload::{Row, TableSchema};
use crate::replica::ReplicaMember;

/// A live connection bound to exactly one replica member.
///
/// At most one transaction is open at a time; `begin` is always followed by
/// `commit` or `rollback` before the connection is used again.
#[async_trait::async_trait]
pub trait ReloadConnection: Send {
    /// Member this connection is bound to
    fn member(&self) -> &ReplicaMember;

    /// Round-trip a trivial query
    async fn ping(&mut self) -> Result<()>;

    /// Open a transaction
    async fn begin(&mut self) -> Result<()>;

    /// Delete every row of `table` inside the open transaction
    async fn delete_all(&mut self, table: &TableSchema) -> Result<u64>;

    /// Insert `rows` into `table` inside the open transaction
    async fn insert_rows(&mut self, table: &TableSchema, rows: &[Row]) -> Result<u64>;

    /// Commit the open transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> Result<()>;
}

/// Opens connections to replica members
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Connection: ReloadConnection;

    async fn connect(&self, member: &ReplicaMember) -> Result<Self::Connection>;
}
