//! Connection Manager
//!
//! Holds the single connection bound to the current leader. Discovery runs
//! only when there is no connection, which is the case at startup and after
//! `invalidate()`.

use crate::discovery::{LeaderDiscovery, LeaderState};
use crate::error::Result;
use crate::executor::{Connector, ReloadConnection};
use crate::replica::ReplicaMember;

/// Leader-bound connection owner
pub struct ConnectionManager<C: Connector> {
    discovery: LeaderDiscovery,
    connector: C,
    current: Option<C::Connection>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(discovery: LeaderDiscovery, connector: C) -> Self {
        Self {
            discovery,
            connector,
            current: None,
        }
    }

    /// Return the leader connection, discovering and connecting if needed.
    pub async fn acquire(&mut self) -> Result<&mut C::Connection> {
        let conn = match self.current.take() {
            Some(conn) => conn,
            None => self.bind_leader().await?,
        };
        Ok(self.current.insert(conn))
    }

    async fn bind_leader(&mut self) -> Result<C::Connection> {
        let leader = self.discovery.discover_leader().await?;

        match self.connector.connect(&leader).await {
            Ok(conn) => {
                tracing::info!("Connected to leader {}", leader);
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!("Connecting to leader {} failed: {}", leader, e);
                self.discovery.invalidate();
                Err(e)
            }
        }
    }

    /// Drop the current connection; the next `acquire` rediscovers.
    pub fn invalidate(&mut self) {
        if let Some(conn) = self.current.take() {
            tracing::debug!("Discarding connection to {}", conn.member());
        }
        self.discovery.invalidate();
    }

    /// Member the live connection is bound to
    pub fn bound_member(&self) -> Option<&ReplicaMember> {
        self.current.as_ref().map(|c| c.member())
    }

    /// Leader as last reported by discovery
    pub fn current_leader(&self) -> Option<&ReplicaMember> {
        self.discovery.state().current_leader.as_ref()
    }

    pub fn leader_state(&self) -> &LeaderState {
        self.discovery.state()
    }
}
