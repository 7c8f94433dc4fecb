//! Leader Discovery
//!
//! Determines which replica member currently accepts writes and caches the
//! answer until it is invalidated. Discovery is opportunistic: members are
//! asked in configured order and the first writable one wins. There is no
//! voting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ReloadConfig;
use crate::discovery::fabric::{FabricCoordinator, MariaDbFabricCoordinator};
use crate::discovery::probe::{MariaDbProbe, ReplicaProbe};
use crate::error::{Error, Result};
use crate::replica::{FabricGroupDescriptor, ReplicaMember, ReplicaRegistry};

/// Which member is believed to be the leader
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeaderState {
    /// Authoritative leader, if any
    pub current_leader: Option<ReplicaMember>,
    /// When the leader last answered as writable
    pub last_verified_at: Option<DateTime<Utc>>,
    /// False forces a fresh probe before the next write
    pub verified: bool,
}

impl LeaderState {
    fn bind(&mut self, member: ReplicaMember) {
        self.current_leader = Some(member);
        self.mark_verified();
    }

    fn mark_verified(&mut self) {
        self.last_verified_at = Some(Utc::now());
        self.verified = true;
    }

    fn clear(&mut self) {
        self.current_leader = None;
        self.verified = false;
    }

    /// Check whether `member` is the verified leader
    pub fn is_verified_leader(&self, member: &ReplicaMember) -> bool {
        self.verified && self.current_leader.as_ref() == Some(member)
    }
}

/// How the leader is found
pub enum DiscoveryMode {
    /// Probe every member directly
    Direct(Box<dyn ReplicaProbe>),
    /// Ask a fabric coordinator for the group primary
    Fabric {
        coordinator: Box<dyn FabricCoordinator>,
        group: FabricGroupDescriptor,
    },
}

/// Leader discovery over a replica registry
pub struct LeaderDiscovery {
    registry: ReplicaRegistry,
    mode: DiscoveryMode,
    state: LeaderState,
}

impl LeaderDiscovery {
    /// Discover by probing members directly
    pub fn direct(registry: ReplicaRegistry, probe: impl ReplicaProbe + 'static) -> Self {
        Self {
            registry,
            mode: DiscoveryMode::Direct(Box::new(probe)),
            state: LeaderState::default(),
        }
    }

    /// Discover through the registry's fabric coordinator
    pub fn fabric(
        registry: ReplicaRegistry,
        coordinator: impl FabricCoordinator + 'static,
    ) -> Result<Self> {
        let group = registry
            .fabric()
            .cloned()
            .ok_or_else(|| Error::Config("fabric discovery needs a fabric group".into()))?;

        Ok(Self {
            registry,
            mode: DiscoveryMode::Fabric {
                coordinator: Box::new(coordinator),
                group,
            },
            state: LeaderState::default(),
        })
    }

    /// Build the discovery strategy the configuration selects
    pub fn from_config(config: &ReloadConfig) -> Result<Self> {
        let registry = config.registry();
        if config.fabric.enabled {
            let coordinator =
                MariaDbFabricCoordinator::new(config.fabric.clone(), config.connect_timeout());
            Self::fabric(registry, coordinator)
        } else {
            Ok(Self::direct(registry, MariaDbProbe::new(config.database.clone())))
        }
    }

    pub fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    pub fn state(&self) -> &LeaderState {
        &self.state
    }

    /// Force the next discovery to re-verify the leader
    pub fn invalidate(&mut self) {
        self.state.verified = false;
    }

    /// Find the writable member, reusing the cached leader if it still is.
    pub async fn discover_leader(&mut self) -> Result<ReplicaMember> {
        let Self { registry, mode, state } = self;

        match mode {
            DiscoveryMode::Direct(probe) => Self::probe_members(registry, &**probe, state).await,
            DiscoveryMode::Fabric { coordinator, group } => {
                Self::ask_coordinator(registry, &**coordinator, group, state).await
            }
        }
    }

    async fn probe_members(
        registry: &ReplicaRegistry,
        probe: &dyn ReplicaProbe,
        state: &mut LeaderState,
    ) -> Result<ReplicaMember> {
        if let Some(cached) = state.current_leader.clone() {
            match probe.is_writable(&cached).await {
                Ok(true) => {
                    tracing::debug!("Leader {} is still writable", cached);
                    state.mark_verified();
                    return Ok(cached);
                }
                Ok(false) => tracing::info!("Leader {} became read-only", cached),
                Err(e) => tracing::warn!("Leader {} failed its probe: {}", cached, e),
            }
        }

        let previous = state.current_leader.take();
        state.verified = false;

        for member in registry.members() {
            if previous.as_ref() == Some(member) {
                continue;
            }

            match probe.is_writable(member).await {
                Ok(true) => {
                    tracing::info!("Bound leader to {}", member);
                    state.bind(member.clone());
                    return Ok(member.clone());
                }
                Ok(false) => tracing::debug!("{} is read-only", member),
                Err(e) => tracing::warn!("Probe of {} failed: {}", member, e),
            }
        }

        state.clear();
        Err(Error::NoWritableReplica {
            candidates: registry.len(),
        })
    }

    async fn ask_coordinator(
        registry: &ReplicaRegistry,
        coordinator: &dyn FabricCoordinator,
        group: &FabricGroupDescriptor,
        state: &mut LeaderState,
    ) -> Result<ReplicaMember> {
        let servers = match coordinator.servers().await {
            Ok(servers) => servers,
            Err(e) => {
                state.clear();
                return Err(match e {
                    Error::CoordinatorUnreachable { .. } => e,
                    other => Error::CoordinatorUnreachable {
                        address: coordinator.address().to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        let in_group: Vec<_> = servers.iter().filter(|s| s.group_id == group.group_id).collect();
        let Some(primary) = in_group.iter().find(|s| s.is_active_primary()) else {
            tracing::warn!(
                "Coordinator {} reports no writable primary in group {}",
                coordinator.address(),
                group.group_id
            );
            state.clear();
            return Err(Error::NoWritableReplica {
                candidates: in_group.len(),
            });
        };

        let member = registry.resolve(&primary.address(), &primary.host);

        if state.current_leader.as_ref() == Some(&member) {
            tracing::debug!("Coordinator confirms leader {}", member);
            state.mark_verified();
        } else {
            tracing::info!("Coordinator moved leader to {}", member);
            state.bind(member.clone());
        }

        Ok(member)
    }
}
