//! Node configuration.
//!
//! A node is configured with its identity, its startup role, where to find
//! the cluster (for joiners), and the timing constants that drive the
//! consensus loop. [`NodeConfig::validate`] rejects combinations that cannot
//! produce a stable cluster before any node state is built.

use crate::error::{RaftregError, Result};
use crate::state::Role;
use crate::types::{NodeAddress, NodeInfo};
use std::time::Duration;

/// Full configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Cluster-unique node name.
    pub name: String,
    /// Address this node is reachable at.
    pub address: NodeAddress,
    /// Role at startup. Only `Leader` (bootstrap node) or `Follower`
    /// (joiner) are valid; candidacy is only ever reached via timer expiry.
    pub startup_role: Role,
    /// Where a joining follower finds the cluster. Ignored by a bootstrap
    /// leader.
    pub cluster_address: Option<NodeAddress>,
    /// Per-peer AppendEntries timeout during a replication cycle.
    pub replication_timeout: Duration,
    /// Fixed heartbeat period. Must be comfortably below `presence_min` or
    /// healthy followers will keep standing for election.
    pub heartbeat_interval: Duration,
    /// Lower bound of the randomized presence timeout.
    pub presence_min: Duration,
    /// Upper bound (exclusive) of the randomized presence timeout.
    pub presence_max: Duration,
    /// Upper bound on one whole election round.
    pub election_round_timeout: Duration,
}

impl NodeConfig {
    /// Configuration with standard timings for a node of the given identity
    /// and startup role.
    pub fn new(name: impl Into<String>, address: NodeAddress, startup_role: Role) -> Self {
        Self {
            name: name.into(),
            address,
            startup_role,
            cluster_address: None,
            replication_timeout: Duration::from_secs(1),
            heartbeat_interval: Duration::from_millis(50),
            presence_min: Duration::from_millis(150),
            presence_max: Duration::from_millis(300),
            election_round_timeout: Duration::from_secs(5),
        }
    }

    /// Point a joining follower at an existing cluster member.
    pub fn with_cluster_address(mut self, address: NodeAddress) -> Self {
        self.cluster_address = Some(address);
        self
    }

    /// This node's identity as advertised to peers.
    pub fn info(&self) -> NodeInfo {
        NodeInfo::new(self.name.clone(), self.address.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RaftregError::InvalidConfig {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.startup_role.is_candidate() {
            return Err(RaftregError::InvalidConfig {
                field: "startup_role".into(),
                reason: "a node cannot start as candidate".into(),
            });
        }
        if self.startup_role.is_follower() && self.cluster_address.is_none() {
            return Err(RaftregError::InvalidConfig {
                field: "cluster_address".into(),
                reason: "a follower needs a cluster member to join through".into(),
            });
        }
        if self.presence_min >= self.presence_max {
            return Err(RaftregError::InvalidConfig {
                field: "presence_min".into(),
                reason: "must be strictly below presence_max".into(),
            });
        }
        if self.heartbeat_interval >= self.presence_min {
            return Err(RaftregError::InvalidConfig {
                field: "heartbeat_interval".into(),
                reason: "must be strictly below presence_min".into(),
            });
        }
        if self.replication_timeout.is_zero() {
            return Err(RaftregError::InvalidConfig {
                field: "replication_timeout".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
