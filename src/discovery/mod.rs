//! Leader Discovery Module
//!
//! Finds the writable member of the replica set, either by probing each
//! member or by asking a fabric coordinator.

mod fabric;
mod leader;
mod probe;

pub use fabric::{FabricCoordinator, FabricServer, MariaDbFabricCoordinator, MODE_READ_WRITE, STATUS_PRIMARY};
pub use leader::{DiscoveryMode, LeaderDiscovery, LeaderState};
pub use probe::{MariaDbProbe, ReplicaProbe};
