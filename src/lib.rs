//! replica-reload - Leader-Aware Table Reloads for MariaDB Replica Sets
//!
//! Replaces the contents of inventory tables on whichever member of a
//! replicated MariaDB set currently accepts writes. The dataset comes from
//! an upstream reporting service as CSV and is swapped in with a single
//! delete-and-insert transaction.
//!
//! # Architecture
//!
//! - A static registry of replica members, optionally fronted by a fabric
//!   coordinator that knows the group primary
//! - Leader discovery that probes `@@read_only` (or asks the coordinator) and
//!   caches the writable member until told otherwise
//! - A connection manager holding one connection bound to that leader
//! - A retry orchestrator running fetch, archive, parse, validate and the
//!   transactional bulk replace under a bounded retry policy
//!
//! # Features
//!
//! - Failover between attempts: every retry rediscovers the leader
//! - All-or-nothing table replacement with explicit rollback
//! - Row validation before any statement reaches the database
//! - Raw payload archive for auditing
//! - Dry-run mode for checking a dataset without writing it

pub mod config;
pub mod error;
pub mod replica;
pub mod discovery;
pub mod executor;
pub mod connection;
pub mod reload;
pub mod upstream;
pub mod archive;
pub mod orchestrator;

pub use config::ReloadConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ReloadConfig;
    pub use crate::error::{Error, Result};
    pub use crate::replica::{ReplicaMember, ReplicaRegistry};
    pub use crate::discovery::{LeaderDiscovery, LeaderState};
    pub use crate::connection::ConnectionManager;
    pub use crate::reload::{ReloadJob, RetryPolicy, TableSchema};
    pub use crate::orchestrator::{RetryOrchestrator, RunReport};
}
