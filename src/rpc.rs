//! Logical RPC messages and the outbound peer client abstraction.
//!
//! The consensus core never touches sockets or framing. It issues requests
//! through [`PeerClient`] and exposes handlers on [`crate::node::RaftNode`];
//! a concrete transport binds the two at the process boundary. The
//! [`memory`] module provides the in-process transport used by tests and
//! demos, including partition simulation.

use crate::command::Command;
use crate::error::Result;
use crate::log::LogEntry;
use crate::state_machine::State;
use crate::types::{LogIndex, NodeAddress, NodeInfo, Term};
use serde::{Deserialize, Serialize};

/// AppendEntries: log replication and heartbeat in one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    /// Sender's identity, adopted as leader on a term bump.
    pub leader: NodeInfo,
    /// Index of the entry immediately preceding `entries` (-1 for a send
    /// starting at the head of the log).
    pub prev_log_index: LogIndex,
    /// Term at `prev_log_index` (-1 when before the log).
    pub prev_log_term: Term,
    /// Entries to store; empty for a pure heartbeat.
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    pub term: Term,
    pub success: bool,
}

/// RequestVote: a candidate soliciting one vote for one term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteReply {
    pub term: Term,
    pub vote_granted: bool,
}

/// RegisterNode: a joiner announcing itself to the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub name: String,
    pub address: NodeAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeReply {
    pub message: String,
    /// The handling node's view of the cluster (itself included), so the
    /// joiner can populate its own membership.
    pub known_peers: Vec<NodeInfo>,
}

/// Reply to a client command: a success description plus the state machine
/// output after the command committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub message: String,
    pub state: State,
}

/// Outbound peer client: everything the core needs from the transport.
///
/// Calls are request/reply, independently addressable per peer, and safe to
/// issue concurrently against different peers. Timeouts and connection
/// failures surface as errors; the core treats them as "no reply".
#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    async fn append_entries(
        &self,
        target: &NodeAddress,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesReply>;

    async fn request_vote(
        &self,
        target: &NodeAddress,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteReply>;

    async fn get_leader(&self, target: &NodeAddress) -> Result<NodeInfo>;

    async fn register_node(
        &self,
        target: &NodeAddress,
        request: RegisterNodeRequest,
    ) -> Result<RegisterNodeReply>;

    /// Forward a client command (follower to leader path).
    async fn apply_command(&self, target: &NodeAddress, command: Command) -> Result<CommandReply>;
}

/// In-process transport wiring whole nodes together without networking.
pub mod memory {
    use super::*;
    use crate::error::RaftregError;
    use crate::node::RaftNode;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Shared registry of nodes, keyed by address. Delivery respects each
    /// node's connected flag on both ends, which is how tests simulate
    /// partitions.
    #[derive(Default)]
    pub struct MemoryCluster {
        nodes: RwLock<HashMap<NodeAddress, Arc<RaftNode>>>,
    }

    impl MemoryCluster {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make a node reachable at its configured address.
        pub fn add_node(&self, node: Arc<RaftNode>) {
            self.nodes.write().insert(node.info().address, node);
        }

        /// A [`PeerClient`] whose outbound calls originate from `local`.
        pub fn client_for(self: &Arc<Self>, local: NodeAddress) -> Arc<MemoryPeerClient> {
            Arc::new(MemoryPeerClient {
                cluster: Arc::clone(self),
                local,
            })
        }

        fn reachable(&self, target: &NodeAddress) -> Result<Arc<RaftNode>> {
            let node = self
                .nodes
                .read()
                .get(target)
                .cloned()
                .ok_or_else(|| RaftregError::PeerUnreachable {
                    peer: target.to_string(),
                    reason: "no such node".to_string(),
                })?;
            if !node.is_connected() {
                return Err(RaftregError::PeerUnreachable {
                    peer: target.to_string(),
                    reason: "node disconnected".to_string(),
                });
            }
            Ok(node)
        }
    }

    /// Per-node handle into a [`MemoryCluster`].
    pub struct MemoryPeerClient {
        cluster: Arc<MemoryCluster>,
        local: NodeAddress,
    }

    impl MemoryPeerClient {
        fn check_local(&self) -> Result<()> {
            if let Some(node) = self.cluster.nodes.read().get(&self.local) {
                if !node.is_connected() {
                    return Err(RaftregError::Disconnected);
                }
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl PeerClient for MemoryPeerClient {
        async fn append_entries(
            &self,
            target: &NodeAddress,
            request: AppendEntriesRequest,
        ) -> Result<AppendEntriesReply> {
            self.check_local()?;
            let node = self.cluster.reachable(target)?;
            Ok(node.handle_append_entries(request))
        }

        async fn request_vote(
            &self,
            target: &NodeAddress,
            request: RequestVoteRequest,
        ) -> Result<RequestVoteReply> {
            self.check_local()?;
            let node = self.cluster.reachable(target)?;
            Ok(node.handle_request_vote(request))
        }

        async fn get_leader(&self, target: &NodeAddress) -> Result<NodeInfo> {
            self.check_local()?;
            let node = self.cluster.reachable(target)?;
            node.handle_get_leader()
        }

        async fn register_node(
            &self,
            target: &NodeAddress,
            request: RegisterNodeRequest,
        ) -> Result<RegisterNodeReply> {
            self.check_local()?;
            let node = self.cluster.reachable(target)?;
            node.handle_register_node(request).await
        }

        async fn apply_command(
            &self,
            target: &NodeAddress,
            command: Command,
        ) -> Result<CommandReply> {
            self.check_local()?;
            let node = self.cluster.reachable(target)?;
            node.handle_apply_command(command).await
        }
    }
}
