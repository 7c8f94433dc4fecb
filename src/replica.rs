//! Replica Registry
//!
//! Static description of the candidate database hosts, loaded once at
//! startup.

use serde::{Deserialize, Serialize};

/// A candidate database host. Identity is the host address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaMember {
    /// Host name or address, optionally with `:port`
    pub host_address: String,
    /// Human readable name shown in status output
    pub display_name: String,
}

impl ReplicaMember {
    /// Create a new member
    pub fn new(host_address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            host_address: host_address.into(),
            display_name: display_name.into(),
        }
    }

    /// Parse the `host|name` form. A missing name defaults to the host.
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('|') {
            Some((host, name)) if !name.trim().is_empty() => Self::new(host.trim(), name.trim()),
            Some((host, _)) => Self::new(host.trim(), host.trim()),
            None => Self::new(entry.trim(), entry.trim()),
        }
    }

    /// Split the address into host and port, falling back to `default_port`
    pub fn endpoint(&self, default_port: u16) -> (&str, u16) {
        match self.host_address.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host, port),
                Err(_) => (self.host_address.as_str(), default_port),
            },
            None => (self.host_address.as_str(), default_port),
        }
    }
}

impl PartialEq for ReplicaMember {
    fn eq(&self, other: &Self) -> bool {
        self.host_address == other.host_address
    }
}

impl Eq for ReplicaMember {}

impl std::fmt::Display for ReplicaMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name == self.host_address {
            write!(f, "{}", self.host_address)
        } else {
            write!(f, "{} ({})", self.host_address, self.display_name)
        }
    }
}

/// Coordinator that can report which member of a group is authoritative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricGroupDescriptor {
    /// Coordinator host
    pub coordinator_address: String,
    /// Group whose primary we want
    pub group_id: String,
}

/// Ordered, immutable set of replica members
#[derive(Debug, Clone, Default)]
pub struct ReplicaRegistry {
    members: Vec<ReplicaMember>,
    fabric: Option<FabricGroupDescriptor>,
}

impl ReplicaRegistry {
    /// Create a registry; members keep their configured order
    pub fn new(members: Vec<ReplicaMember>, fabric: Option<FabricGroupDescriptor>) -> Self {
        Self { members, fabric }
    }

    pub fn members(&self) -> &[ReplicaMember] {
        &self.members
    }

    pub fn fabric(&self) -> Option<&FabricGroupDescriptor> {
        self.fabric.as_ref()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Look up a member by host address
    pub fn get(&self, host_address: &str) -> Option<&ReplicaMember> {
        self.members.iter().find(|m| m.host_address == host_address)
    }

    /// Resolve a server reported by a coordinator as `address` (host with
    /// optional `:port`) on `host`. A member configured under either keeps
    /// its display name; the reported address always wins so the port is
    /// not lost.
    pub fn resolve(&self, address: &str, host: &str) -> ReplicaMember {
        if let Some(member) = self.get(address) {
            return member.clone();
        }
        match self.get(host) {
            Some(member) => ReplicaMember::new(address, member.display_name.clone()),
            None => ReplicaMember::new(address, address),
        }
    }
}
