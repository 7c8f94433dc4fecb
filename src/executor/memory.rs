//! In-process replica set used by the unit tests.
//!
//! All members share one table store, the way replicated servers converge,
//! while each keeps its own read-only flag and reachability. Transactions
//! stage a copy of the store and only publish it on commit.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::discovery::{FabricCoordinator, FabricServer, ReplicaProbe};
use crate::error::{Error, Result};
use crate::executor::{Connector, ReloadConnection};
use crate::reload::{ReloadStep, Row, TableSchema};
use crate::replica::ReplicaMember;

type Tables = HashMap<String, Vec<Row>>;

/// Statement issued against a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Ping,
    Begin,
    Delete,
    Insert,
    Commit,
    Rollback,
}

#[derive(Default)]
struct Inner {
    hosts: Vec<String>,
    writable: HashSet<String>,
    unreachable: HashSet<String>,
    tables: Tables,
    statements: Vec<(String, StatementKind)>,
    probes: Vec<String>,
    connects: Vec<String>,
    fail_insert_after: Option<usize>,
    fail_commit: bool,
    fail_rollback: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryReplicaSet {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryReplicaSet {
    /// All members start reachable and read-only
    pub fn new(hosts: &[&str]) -> Self {
        let set = Self::default();
        set.lock().hosts = hosts.iter().map(|h| h.to_string()).collect();
        set
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `host` the only writable member
    pub fn set_writable(&self, host: &str) {
        let mut inner = self.lock();
        inner.writable.clear();
        inner.writable.insert(host.to_string());
    }

    /// Make `host` writable without demoting others
    pub fn mark_writable(&self, host: &str) {
        self.lock().writable.insert(host.to_string());
    }

    pub fn set_read_only_all(&self) {
        self.lock().writable.clear();
    }

    pub fn set_reachable(&self, host: &str, reachable: bool) {
        let mut inner = self.lock();
        if reachable {
            inner.unreachable.remove(host);
        } else {
            inner.unreachable.insert(host.to_string());
        }
    }

    pub fn is_writable(&self, host: &str) -> bool {
        self.lock().writable.contains(host)
    }

    /// Writable members in configured order
    pub fn writable_hosts(&self) -> Vec<String> {
        let inner = self.lock();
        inner
            .hosts
            .iter()
            .filter(|h| inner.writable.contains(*h))
            .cloned()
            .collect()
    }

    /// Fail the INSERT step after `rows` rows have been staged
    pub fn fail_insert_after(&self, rows: usize) {
        self.lock().fail_insert_after = Some(rows);
    }

    pub fn fail_commit(&self) {
        self.lock().fail_commit = true;
    }

    pub fn fail_rollback(&self) {
        self.lock().fail_rollback = true;
    }

    pub fn seed(&self, table: &TableSchema, rows: Vec<Row>) {
        self.lock().tables.insert(table.name.to_string(), rows);
    }

    pub fn rows(&self, table: &TableSchema) -> Vec<Row> {
        self.lock().tables.get(table.name).cloned().unwrap_or_default()
    }

    pub fn statements(&self) -> Vec<(String, StatementKind)> {
        self.lock().statements.clone()
    }

    /// DELETE and INSERT statements issued so far
    pub fn mutations(&self) -> usize {
        self.lock()
            .statements
            .iter()
            .filter(|(_, kind)| matches!(kind, StatementKind::Delete | StatementKind::Insert))
            .count()
    }

    pub fn probes(&self) -> Vec<String> {
        self.lock().probes.clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.lock().connects.clone()
    }
}

#[async_trait::async_trait]
impl ReplicaProbe for MemoryReplicaSet {
    async fn is_writable(&self, member: &ReplicaMember) -> Result<bool> {
        let mut inner = self.lock();
        inner.probes.push(member.host_address.clone());
        if inner.unreachable.contains(&member.host_address) {
            return Err(Error::ConnectionFailed {
                address: member.host_address.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(inner.writable.contains(&member.host_address))
    }
}

#[async_trait::async_trait]
impl Connector for MemoryReplicaSet {
    type Connection = MemoryConnection;

    async fn connect(&self, member: &ReplicaMember) -> Result<MemoryConnection> {
        let mut inner = self.lock();
        inner.connects.push(member.host_address.clone());
        if inner.unreachable.contains(&member.host_address) {
            return Err(Error::ConnectionFailed {
                address: member.host_address.clone(),
                reason: "connection refused".into(),
            });
        }

        Ok(MemoryConnection {
            member: member.clone(),
            set: self.clone(),
            staged: None,
        })
    }
}

pub(crate) struct MemoryConnection {
    member: ReplicaMember,
    set: MemoryReplicaSet,
    staged: Option<Tables>,
}

impl MemoryConnection {
    fn record(&self, kind: StatementKind) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.set.lock();
        inner.statements.push((self.member.host_address.clone(), kind));
        if inner.unreachable.contains(&self.member.host_address) {
            return Err(Error::ConnectionFailed {
                address: self.member.host_address.clone(),
                reason: "server has gone away".into(),
            });
        }
        Ok(inner)
    }

    fn writable_check(&self, inner: &Inner, step: ReloadStep) -> Result<()> {
        if !inner.writable.contains(&self.member.host_address) {
            return Err(Error::transaction(
                step,
                &self.member.host_address,
                "server is running with the --read-only option",
            ));
        }
        Ok(())
    }

    fn staged_tables(&mut self, step: ReloadStep) -> Result<&mut Tables> {
        let host = &self.member.host_address;
        self.staged
            .as_mut()
            .ok_or_else(|| Error::transaction(step, host, "no open transaction"))
    }
}

#[async_trait::async_trait]
impl ReloadConnection for MemoryConnection {
    fn member(&self) -> &ReplicaMember {
        &self.member
    }

    async fn ping(&mut self) -> Result<()> {
        self.record(StatementKind::Ping).map(|_| ())
    }

    async fn begin(&mut self) -> Result<()> {
        let snapshot = self.record(StatementKind::Begin)?.tables.clone();
        self.staged = Some(snapshot);
        Ok(())
    }

    async fn delete_all(&mut self, table: &TableSchema) -> Result<u64> {
        {
            let inner = self.record(StatementKind::Delete)?;
            self.writable_check(&inner, ReloadStep::Delete)?;
        }
        let staged = self.staged_tables(ReloadStep::Delete)?;
        Ok(staged.remove(table.name).map(|rows| rows.len() as u64).unwrap_or(0))
    }

    async fn insert_rows(&mut self, table: &TableSchema, rows: &[Row]) -> Result<u64> {
        let fail_after = {
            let inner = self.record(StatementKind::Insert)?;
            self.writable_check(&inner, ReloadStep::Insert)?;
            inner.fail_insert_after
        };

        let host = self.member.host_address.clone();
        let staged = self.staged_tables(ReloadStep::Insert)?;
        let target = staged.entry(table.name.to_string()).or_default();
        for (i, row) in rows.iter().enumerate() {
            if fail_after == Some(i) {
                return Err(Error::transaction(
                    ReloadStep::Insert,
                    &host,
                    format!("Duplicate entry for row {}", i + 1),
                ));
            }
            target.push(row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.record(StatementKind::Commit)?.fail_commit {
            return Err(Error::transaction(
                ReloadStep::Commit,
                &self.member.host_address,
                "Lost connection during commit",
            ));
        }
        let staged = self.staged_tables(ReloadStep::Commit)?.clone();
        self.staged = None;
        self.set.lock().tables = staged;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let fail = self.record(StatementKind::Rollback)?.fail_rollback;
        self.staged = None;
        if fail {
            return Err(Error::transaction(
                ReloadStep::Rollback,
                &self.member.host_address,
                "rollback interrupted",
            ));
        }
        Ok(())
    }
}

/// Coordinator returning a fixed server dump
#[derive(Clone)]
pub(crate) struct MemoryFabric {
    servers: Arc<Mutex<Vec<FabricServer>>>,
    reachable: Arc<Mutex<bool>>,
}

impl MemoryFabric {
    pub fn new(servers: Vec<FabricServer>) -> Self {
        Self {
            servers: Arc::new(Mutex::new(servers)),
            reachable: Arc::new(Mutex::new(true)),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().unwrap_or_else(|e| e.into_inner()) = reachable;
    }
}

#[async_trait::async_trait]
impl FabricCoordinator for MemoryFabric {
    fn address(&self) -> &str {
        "fabric01"
    }

    async fn servers(&self) -> Result<Vec<FabricServer>> {
        if !*self.reachable.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(Error::Internal("Can't connect to MySQL server on 'fabric01'".into()));
        }
        Ok(self.servers.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
