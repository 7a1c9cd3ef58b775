//! One election round: solicit votes from every peer and tally the result.
//!
//! The coordinator is stateless between rounds. The caller bumps the term,
//! flips to candidate, and hands this module the frozen term number; whatever
//! the node's state becomes while the round is in flight is the caller's
//! problem to re-check before acting on the outcome.

use crate::rpc::{PeerClient, RequestVoteRequest};
use crate::types::{NodeInfo, Term};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a completed election round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// A strict majority of the cluster granted their vote.
    Won,
    /// The round completed without a majority.
    Lost,
    /// Some peer already lives in a higher term; the candidacy is stale.
    HigherTerm(Term),
}

pub struct ElectionCoordinator {
    client: Arc<dyn PeerClient>,
    /// Upper bound on the whole round; peers that have not answered by then
    /// contribute no vote to the tally.
    round_timeout: Duration,
}

impl ElectionCoordinator {
    pub fn new(client: Arc<dyn PeerClient>, round_timeout: Duration) -> Self {
        Self {
            client,
            round_timeout,
        }
    }

    /// Run one round for `term`. The candidate's own vote is counted here;
    /// a strict majority of the full cluster (candidate plus `peers`) wins.
    pub async fn run(&self, candidate: &str, term: Term, peers: &[NodeInfo]) -> ElectionOutcome {
        let cluster_size = peers.len() + 1;
        let needed = cluster_size / 2 + 1;
        info!(node = candidate, term, cluster_size, needed, "starting election round");

        let requests = peers.iter().map(|peer| {
            let client = Arc::clone(&self.client);
            let timeout = self.round_timeout;
            let request = RequestVoteRequest {
                term,
                candidate_id: candidate.to_string(),
            };
            let peer = peer.clone();
            async move {
                match tokio::time::timeout(timeout, client.request_vote(&peer.address, request))
                    .await
                {
                    Ok(Ok(reply)) => Some(reply),
                    Ok(Err(err)) => {
                        debug!(peer = %peer.name, %err, "vote request failed");
                        None
                    }
                    Err(_) => {
                        debug!(peer = %peer.name, "vote request timed out");
                        None
                    }
                }
            }
        });

        let mut granted = 1; // own vote
        let mut highest_term = term;
        for reply in join_all(requests).await.into_iter().flatten() {
            if reply.term > highest_term {
                highest_term = reply.term;
            }
            if reply.vote_granted {
                granted += 1;
            }
        }

        if highest_term > term {
            info!(node = candidate, term, highest_term, "election superseded by higher term");
            return ElectionOutcome::HigherTerm(highest_term);
        }
        if granted >= needed {
            info!(node = candidate, term, granted, "election won");
            ElectionOutcome::Won
        } else {
            info!(node = candidate, term, granted, needed, "election lost");
            ElectionOutcome::Lost
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::error::{RaftregError, Result};
    use crate::rpc::{
        AppendEntriesReply, AppendEntriesRequest, CommandReply, RegisterNodeReply,
        RegisterNodeRequest, RequestVoteReply,
    };
    use crate::types::NodeAddress;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripted voter pool: a reply per port, errors for unknown ports.
    struct ScriptedVoters {
        replies: Mutex<HashMap<u16, RequestVoteReply>>,
    }

    impl ScriptedVoters {
        fn new(replies: &[(u16, Term, bool)]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|&(port, term, vote_granted)| {
                            (port, RequestVoteReply { term, vote_granted })
                        })
                        .collect(),
                ),
            })
        }
    }

    #[async_trait::async_trait]
    impl PeerClient for ScriptedVoters {
        async fn append_entries(
            &self,
            _target: &NodeAddress,
            _request: AppendEntriesRequest,
        ) -> Result<AppendEntriesReply> {
            unimplemented!("not used in election tests")
        }

        async fn request_vote(
            &self,
            target: &NodeAddress,
            _request: RequestVoteRequest,
        ) -> Result<RequestVoteReply> {
            self.replies
                .lock()
                .get(&target.port)
                .cloned()
                .ok_or_else(|| RaftregError::PeerUnreachable {
                    peer: target.to_string(),
                    reason: "scripted failure".into(),
                })
        }

        async fn get_leader(&self, _target: &NodeAddress) -> Result<NodeInfo> {
            unimplemented!("not used in election tests")
        }

        async fn register_node(
            &self,
            _target: &NodeAddress,
            _request: RegisterNodeRequest,
        ) -> Result<RegisterNodeReply> {
            unimplemented!("not used in election tests")
        }

        async fn apply_command(
            &self,
            _target: &NodeAddress,
            _command: Command,
        ) -> Result<CommandReply> {
            unimplemented!("not used in election tests")
        }
    }

    fn peers(ports: &[u16]) -> Vec<NodeInfo> {
        ports
            .iter()
            .map(|&port| NodeInfo::new(format!("peer{port}"), NodeAddress::new("localhost", port)))
            .collect()
    }

    fn coordinator(client: Arc<dyn PeerClient>) -> ElectionCoordinator {
        ElectionCoordinator::new(client, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn wins_with_majority_including_own_vote() {
        // Three-node cluster: one granted peer vote plus our own is enough.
        let voters = ScriptedVoters::new(&[(5002, 1, true), (5003, 1, false)]);
        let outcome = coordinator(voters)
            .run("candidate1", 1, &peers(&[5002, 5003]))
            .await;
        assert_eq!(outcome, ElectionOutcome::Won);
    }

    #[tokio::test]
    async fn loses_without_majority() {
        let voters = ScriptedVoters::new(&[(5002, 1, false), (5003, 1, false)]);
        let outcome = coordinator(voters)
            .run("candidate1", 1, &peers(&[5002, 5003]))
            .await;
        assert_eq!(outcome, ElectionOutcome::Lost);
    }

    #[tokio::test]
    async fn unreachable_peers_contribute_no_votes() {
        // Five-node cluster, only one reachable granting peer: 2 of 5 loses.
        let voters = ScriptedVoters::new(&[(5002, 1, true)]);
        let outcome = coordinator(voters)
            .run("candidate1", 1, &peers(&[5002, 5003, 5004, 5005]))
            .await;
        assert_eq!(outcome, ElectionOutcome::Lost);
    }

    #[tokio::test]
    async fn higher_term_supersedes_even_a_majority() {
        let voters = ScriptedVoters::new(&[(5002, 1, true), (5003, 4, false)]);
        let outcome = coordinator(voters)
            .run("candidate1", 1, &peers(&[5002, 5003]))
            .await;
        assert_eq!(outcome, ElectionOutcome::HigherTerm(4));
    }

    #[tokio::test]
    async fn lone_node_wins_immediately() {
        let voters = ScriptedVoters::new(&[]);
        let outcome = coordinator(voters).run("leader1", 1, &[]).await;
        assert_eq!(outcome, ElectionOutcome::Won);
    }
}
