//! Leader-side log replication: request building, parallel fan-out, and
//! commit index advancement.
//!
//! One replication cycle snapshots what each peer needs under the state lock,
//! sends all AppendEntries requests concurrently without holding any lock,
//! then reports per-peer outcomes for the caller to fold back into membership
//! progress. A peer that times out or is unreachable simply contributes no
//! acknowledgement this cycle.

use crate::log::ReplicationLog;
use crate::membership::ClusterMembership;
use crate::rpc::{AppendEntriesRequest, PeerClient};
use crate::state::NodeState;
use crate::types::{LogIndex, NodeAddress, NodeInfo, Term};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One peer's outbound AppendEntries for this cycle.
#[derive(Debug, Clone)]
pub struct PeerSend {
    pub name: String,
    pub address: NodeAddress,
    pub request: AppendEntriesRequest,
    /// How many entries the request carries; on success, `next_index`
    /// advances by exactly this much.
    pub entries_sent: LogIndex,
}

/// What came back from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Peer accepted and stored the entries.
    Success { entries_sent: LogIndex },
    /// Peer rejected the consistency check (or is ahead in term).
    Rejected { term: Term },
    /// No usable reply: timeout, transport failure, or disconnected peer.
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct PeerOutcome {
    pub name: String,
    pub result: SendResult,
}

/// Builds one [`PeerSend`] per known peer from the leader's current state.
/// Call under the state and membership locks; the result borrows nothing.
pub fn build_sends(
    leader: &NodeInfo,
    state: &NodeState,
    membership: &ClusterMembership,
) -> Vec<PeerSend> {
    membership
        .peers()
        .into_iter()
        .map(|peer| {
            let next_index = membership.next_index(&peer.name);
            let entries = state.log.entries_from(next_index);
            let entries_sent = entries.len() as LogIndex;
            let prev_log_index = next_index - 1;
            let request = AppendEntriesRequest {
                term: state.current_term,
                leader: leader.clone(),
                prev_log_index,
                prev_log_term: state.log.term_at(prev_log_index),
                entries,
                leader_commit: state.commit_index,
            };
            PeerSend {
                name: peer.name,
                address: peer.address,
                request,
                entries_sent,
            }
        })
        .collect()
}

/// Sends AppendEntries to every peer in parallel with a per-peer timeout.
pub struct LogReplicator {
    client: Arc<dyn PeerClient>,
    timeout: Duration,
}

impl LogReplicator {
    pub fn new(client: Arc<dyn PeerClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fan out all sends concurrently and collect one outcome per peer.
    /// Must not be called while holding any lock.
    pub async fn replicate(&self, sends: Vec<PeerSend>) -> Vec<PeerOutcome> {
        let futures = sends.into_iter().map(|send| {
            let client = Arc::clone(&self.client);
            let timeout = self.timeout;
            async move {
                let result = match tokio::time::timeout(
                    timeout,
                    client.append_entries(&send.address, send.request),
                )
                .await
                {
                    Ok(Ok(reply)) if reply.success => SendResult::Success {
                        entries_sent: send.entries_sent,
                    },
                    Ok(Ok(reply)) => SendResult::Rejected { term: reply.term },
                    Ok(Err(err)) => {
                        debug!(peer = %send.name, %err, "append entries failed");
                        SendResult::Unreachable
                    }
                    Err(_) => {
                        debug!(peer = %send.name, "append entries timed out");
                        SendResult::Unreachable
                    }
                };
                PeerOutcome {
                    name: send.name,
                    result,
                }
            }
        });
        join_all(futures).await
    }
}

/// True when every peer's confirmed progress has reached the end of the log.
pub fn is_replication_complete(last_index: LogIndex, match_indexes: &[LogIndex]) -> bool {
    match_indexes.iter().all(|&m| m >= last_index)
}

/// Majority-based commit advancement over peer match indices.
///
/// The leader itself always counts toward the majority, which is taken
/// against the full cluster size (leader plus all known peers). Only entries
/// from the current term may be committed by counting; earlier-term entries
/// commit implicitly once a later entry does.
pub struct CommitIndexCalculator {
    /// Leader plus all known peers.
    cluster_size: usize,
}

impl CommitIndexCalculator {
    pub fn new(cluster_size: usize) -> Self {
        Self { cluster_size }
    }

    /// Highest index that may be committed, given the current commit index
    /// and each peer's `match_index`. Returns the unchanged commit index when
    /// nothing new qualifies.
    pub fn advance(
        &self,
        log: &ReplicationLog,
        current_commit: LogIndex,
        current_term: Term,
        match_indexes: &[LogIndex],
    ) -> LogIndex {
        let last_index = log.last_index();

        // A cluster of one commits its own appends immediately.
        if match_indexes.is_empty() {
            return last_index.max(current_commit);
        }

        let mut candidate = last_index;
        while candidate > current_commit {
            let acks = 1 + match_indexes.iter().filter(|&&m| m >= candidate).count();
            if acks * 2 > self.cluster_size && log.term_at(candidate) == current_term {
                return candidate;
            }
            candidate -= 1;
        }
        current_commit
    }
}
