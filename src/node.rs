//! The node itself: role transitions, RPC handlers, timer callbacks, and the
//! leader's replication cycle.
//!
//! Locking is deliberately coarse. `state` guards everything consensus-level
//! on this node and is never held across an `.await`; `membership` may only
//! be taken while `state` is already held or while `state` is not held at
//! all, never the other way around. The `replication_gate` serializes whole
//! replicate-commit-apply cycles so heartbeats and client commands cannot
//! interleave half a cycle each.

use crate::command::Command;
use crate::config::NodeConfig;
use crate::election::{ElectionCoordinator, ElectionOutcome};
use crate::error::{RaftregError, Result};
use crate::membership::ClusterMembership;
use crate::replication::{build_sends, CommitIndexCalculator, LogReplicator, SendResult};
use crate::rpc::{
    AppendEntriesReply, AppendEntriesRequest, CommandReply, PeerClient, RegisterNodeReply,
    RegisterNodeRequest, RequestVoteReply, RequestVoteRequest,
};
use crate::state::{NodeState, Role};
use crate::state_machine::State;
use crate::timer::{HeartbeatTimer, PresenceTimer};
use crate::types::{NodeInfo, Term};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How many replication cycles a client command waits for its entry to
/// commit before the reply is returned with the entry still pending.
const APPLY_COMMAND_CYCLES: usize = 3;

/// One member of the cluster, with its timers, state, and peer view.
pub struct RaftNode {
    config: NodeConfig,
    info: NodeInfo,
    state: RwLock<NodeState>,
    membership: RwLock<ClusterMembership>,
    client: Arc<dyn PeerClient>,
    replicator: LogReplicator,
    elector: ElectionCoordinator,
    presence: PresenceTimer,
    heartbeat: HeartbeatTimer,
    replication_gate: Mutex<()>,
    connected: AtomicBool,
}

impl RaftNode {
    /// Build a node from its configuration and transport. Must be called
    /// inside a tokio runtime; the timers spawn tasks when armed.
    pub fn new(config: NodeConfig, client: Arc<dyn PeerClient>) -> Result<Arc<Self>> {
        config.validate()?;
        let info = config.info();
        let state = NodeState::new(config.name.clone(), config.startup_role);

        Ok(Arc::new_cyclic(|weak: &Weak<RaftNode>| {
            let presence_node = weak.clone();
            let presence = PresenceTimer::new(
                config.presence_min,
                config.presence_max,
                Arc::new(move || {
                    if let Some(node) = presence_node.upgrade() {
                        tokio::spawn(async move { node.on_presence_expired().await });
                    }
                }),
            );

            let heartbeat_node = weak.clone();
            let heartbeat = HeartbeatTimer::new(
                config.heartbeat_interval,
                Arc::new(move || {
                    if let Some(node) = heartbeat_node.upgrade() {
                        tokio::spawn(async move { node.on_heartbeat().await });
                    }
                }),
            );

            Self {
                info,
                state: RwLock::new(state),
                membership: RwLock::new(ClusterMembership::new()),
                replicator: LogReplicator::new(Arc::clone(&client), config.replication_timeout),
                elector: ElectionCoordinator::new(
                    Arc::clone(&client),
                    config.election_round_timeout,
                ),
                presence,
                heartbeat,
                replication_gate: Mutex::new(()),
                connected: AtomicBool::new(true),
                client,
                config,
            }
        }))
    }

    pub fn info(&self) -> NodeInfo {
        self.info.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Bring the node online in its configured startup role. A leader begins
    /// heartbeating an empty cluster; a follower joins through its configured
    /// cluster address and then watches for leader presence.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        match self.config.startup_role {
            Role::Leader => {
                let term = self.state.read().current_term;
                self.become_leader(term);
                Ok(())
            }
            Role::Follower => self.join_cluster().await,
            Role::Candidate => Err(RaftregError::UnknownRole("candidate".into())),
        }
    }

    async fn join_cluster(self: &Arc<Self>) -> Result<()> {
        let seed = self
            .config
            .cluster_address
            .clone()
            .ok_or_else(|| RaftregError::InvalidConfig {
                field: "cluster_address".into(),
                reason: "a follower needs a cluster member to join through".into(),
            })?;

        let leader = self.client.get_leader(&seed).await?;
        let reply = self
            .client
            .register_node(
                &leader.address,
                RegisterNodeRequest {
                    name: self.info.name.clone(),
                    address: self.info.address.clone(),
                },
            )
            .await?;
        info!(node = %self.info.name, message = %reply.message, "joined cluster");

        {
            let mut membership = self.membership.write();
            for peer in reply.known_peers {
                if peer.name != self.info.name {
                    membership.add_peer(peer.name, peer.address);
                }
            }
        }
        let term = self.state.read().current_term;
        self.become_follower(Some(leader), term);
        Ok(())
    }

    fn become_leader(&self, term: Term) {
        self.presence.stop();
        {
            let mut state = self.state.write();
            state.set_leader(self.info.clone(), term);
            self.membership.write().reset_progress();
        }
        self.heartbeat.start();
    }

    fn become_follower(&self, leader: Option<NodeInfo>, term: Term) {
        self.heartbeat.stop();
        self.state.write().set_follower(leader, term);
        self.presence.start();
    }

    /// Presence timer expiry: the leader has gone quiet, stand for election.
    async fn on_presence_expired(self: Arc<Self>) {
        if !self.is_connected() {
            // No campaigning into a void; try again after the next window.
            self.presence.start();
            return;
        }
        if self.state.read().role.is_leader() {
            return;
        }

        let term = {
            let mut state = self.state.write();
            let term = state.set_candidate();
            state.record_vote(self.info.name.clone());
            term
        };
        let peers = self.membership.read().peers();
        let outcome = self.elector.run(&self.info.name, term, &peers).await;

        self.conclude_election(term, outcome);
    }

    /// Apply an election outcome, but only if this node is still the same
    /// candidate in the same term. The check and the transition happen under
    /// one write lock, so an AppendEntries that raised the term while the
    /// round was in flight cannot be overwritten by a stale win.
    fn conclude_election(&self, election_term: Term, outcome: ElectionOutcome) {
        let mut state = self.state.write();
        if !state.role.is_candidate() || state.current_term != election_term {
            return;
        }
        match outcome {
            ElectionOutcome::Won => {
                self.presence.stop();
                state.set_leader(self.info.clone(), election_term);
                self.membership.write().reset_progress();
                self.heartbeat.start();
            }
            ElectionOutcome::Lost => {
                state.set_follower(None, election_term);
                self.presence.start();
            }
            ElectionOutcome::HigherTerm(higher) => {
                state.set_follower(None, higher);
                self.presence.start();
            }
        }
    }

    /// Heartbeat tick: run one replication cycle if still a connected leader.
    async fn on_heartbeat(self: Arc<Self>) {
        if !self.is_connected() || !self.state.read().role.is_leader() {
            return;
        }
        self.reconcile_cluster().await;
    }

    /// One full replicate-commit-apply cycle. Serialized by the gate so that
    /// overlapping heartbeats and client commands each see a complete cycle.
    async fn reconcile_cluster(self: &Arc<Self>) {
        let _gate = self.replication_gate.lock().await;
        if !self.is_connected() || !self.state.read().role.is_leader() {
            return;
        }

        let sends = {
            let state = self.state.read();
            let membership = self.membership.read();
            build_sends(&self.info, &state, &membership)
        };
        let outcomes = self.replicator.replicate(sends).await;

        {
            let mut membership = self.membership.write();
            for outcome in outcomes {
                match outcome.result {
                    SendResult::Success { entries_sent } => {
                        membership.record_success(&outcome.name, entries_sent);
                    }
                    SendResult::Rejected { .. } => membership.record_failure(&outcome.name),
                    SendResult::Unreachable => {}
                }
            }
        }

        let mut state = self.state.write();
        let membership = self.membership.read();
        let calculator = CommitIndexCalculator::new(membership.len() + 1);
        let new_commit = calculator.advance(
            &state.log,
            state.commit_index,
            state.current_term,
            &membership.match_indexes(),
        );
        drop(membership);
        if new_commit > state.commit_index {
            info!(
                node = %self.info.name,
                from = state.commit_index,
                to = new_commit,
                "commit index advanced by majority"
            );
            state.commit_index = new_commit;
            state.apply_committed();
        }
    }

    /// Inbound AppendEntries: term fencing, consistency check, truncate and
    /// store, then follow the leader's commit index.
    pub fn handle_append_entries(self: &Arc<Self>, request: AppendEntriesRequest) -> AppendEntriesReply {
        let mut state = self.state.write();

        // Stale leader: refuse and do not treat it as presence.
        if request.term < state.current_term {
            return AppendEntriesReply {
                term: state.current_term,
                success: false,
            };
        }

        if request.term > state.current_term
            || (state.role.is_candidate() && request.term == state.current_term)
        {
            // A legitimate leader exists for this term.
            self.heartbeat.stop();
            state.set_follower(Some(request.leader.clone()), request.term);
        } else if state.role.is_leader() {
            // Same term, and this node believes it leads it. Vote safety
            // makes this unreachable with a correct sender; refuse.
            return AppendEntriesReply {
                term: state.current_term,
                success: false,
            };
        } else {
            state.leader_info = Some(request.leader.clone());
        }

        // The message is from the live leader either way from here on.
        self.presence.reset();

        let term = state.current_term;
        if state.log.term_at(request.prev_log_index) != request.prev_log_term {
            return AppendEntriesReply {
                term,
                success: false,
            };
        }

        // Everything after the agreed prefix is superseded by the leader's
        // version, committed entries can never be among it. This also runs
        // for a pure heartbeat, so stale entries past the end of the
        // leader's log are dropped rather than lingering.
        state.log.remove_from(request.prev_log_index + 1);
        for entry in request.entries {
            state.log.append(entry);
        }

        state.observe_leader_commit(request.leader_commit);
        state.apply_committed();

        AppendEntriesReply {
            term,
            success: true,
        }
    }

    /// Inbound RequestVote: one vote per term, first come first served.
    pub fn handle_request_vote(self: &Arc<Self>, request: RequestVoteRequest) -> RequestVoteReply {
        let mut state = self.state.write();

        if request.term < state.current_term {
            return RequestVoteReply {
                term: state.current_term,
                vote_granted: false,
            };
        }

        if request.term > state.current_term {
            // Adopt the newer term. Role only changes through AppendEntries
            // or an election outcome, and vote state only clears on explicit
            // leader/follower transitions; the guard below still decides the
            // vote on its own.
            state.current_term = request.term;
        }

        if state.last_vote_term == state.current_term && state.voted_for.is_some() {
            return RequestVoteReply {
                term: state.current_term,
                vote_granted: false,
            };
        }

        state.record_vote(request.candidate_id.clone());
        info!(node = %self.info.name, term = state.current_term, candidate = %request.candidate_id, "vote granted");
        RequestVoteReply {
            term: state.current_term,
            vote_granted: true,
        }
    }

    /// Where the cluster's leader currently is, as far as this node knows.
    pub fn handle_get_leader(&self) -> Result<NodeInfo> {
        self.state
            .read()
            .leader_info
            .clone()
            .ok_or(RaftregError::LeaderUnknown)
    }

    /// Inbound RegisterNode. Every node records the newcomer; the leader
    /// additionally rebroadcasts it so existing members learn of it too.
    pub async fn handle_register_node(
        self: &Arc<Self>,
        request: RegisterNodeRequest,
    ) -> Result<RegisterNodeReply> {
        if request.name == self.info.name {
            return Err(RaftregError::UnknownPeer(request.name));
        }

        let (message, prior_peers, is_leader) = {
            let state = self.state.read();
            let mut membership = self.membership.write();
            let prior_peers: Vec<NodeInfo> = membership
                .peers()
                .into_iter()
                .filter(|peer| peer.name != request.name)
                .collect();
            let message = membership.add_peer(request.name.clone(), request.address.clone());
            (message, prior_peers, state.role.is_leader())
        };
        info!(node = %self.info.name, %message, "registered node");

        if is_leader {
            for peer in &prior_peers {
                if let Err(err) = self
                    .client
                    .register_node(&peer.address, request.clone())
                    .await
                {
                    warn!(node = %self.info.name, peer = %peer.name, %err, "rebroadcast of registration failed");
                }
            }
        }

        let mut known_peers = vec![self.info.clone()];
        known_peers.extend(self.membership.read().peers());
        Ok(RegisterNodeReply {
            message,
            known_peers,
        })
    }

    /// Client command entry point. Followers forward to the leader; leaders
    /// append, replicate, and reply once the entry commits (or after a few
    /// cycles if part of the cluster is unreachable). A candidate appends
    /// locally and lets the next leader settle the entry's fate.
    pub async fn handle_apply_command(self: &Arc<Self>, command: Command) -> Result<CommandReply> {
        let role = self.state.read().role;

        if role.is_follower() {
            let leader = self.handle_get_leader()?;
            return self.client.apply_command(&leader.address, command).await;
        }

        let entry_index = {
            let mut state = self.state.write();
            state.append_command(command.clone());
            state.log.last_index()
        };
        info!(node = %self.info.name, %command, index = entry_index, "command appended");

        if role.is_leader() {
            // Replicate now rather than waiting out the heartbeat interval.
            self.heartbeat.stop();
            for _ in 0..APPLY_COMMAND_CYCLES {
                self.reconcile_cluster().await;
                if self.state.read().commit_index >= entry_index {
                    break;
                }
            }
            // Deposed mid-command: the new leader owns the heartbeat now.
            if self.state.read().role.is_leader() {
                self.heartbeat.start();
            }
        }

        let (committed, machine_state) = {
            let state = self.state.read();
            (state.commit_index >= entry_index, state.machine_state())
        };
        let message = if committed {
            format!("{command} applied")
        } else {
            format!("{command} accepted")
        };
        Ok(CommandReply {
            message,
            state: machine_state,
        })
    }

    /// Simulate losing the network: inbound and outbound traffic stops, the
    /// node keeps running.
    pub fn disconnect(&self) -> String {
        self.connected.store(false, Ordering::SeqCst);
        info!(node = %self.info.name, "node disconnected");
        "Node disconnected.".to_string()
    }

    /// Rejoin the network. A stale leader rejoining will be corrected by the
    /// current leader's first AppendEntries.
    pub fn reconnect(&self) -> String {
        self.connected.store(true, Ordering::SeqCst);
        info!(node = %self.info.name, "node reconnected");
        "Node reconnected.".to_string()
    }

    pub fn role(&self) -> Role {
        self.state.read().role
    }

    pub fn current_term(&self) -> Term {
        self.state.read().current_term
    }

    pub fn commit_index(&self) -> crate::types::LogIndex {
        self.state.read().commit_index
    }

    /// The node's applied state machine output.
    pub fn machine_state(&self) -> State {
        self.state.read().machine_state()
    }

    /// Printable log contents, e.g. `(A=1), (A+5)`.
    pub fn log_info(&self) -> String {
        self.state.read().log.to_string()
    }

    /// Printable cursor summary, e.g. `commitIndex=-1, term=0, lastApplied=-1`.
    pub fn node_status(&self) -> String {
        self.state.read().status_line()
    }

    /// Printable per-peer replication progress (meaningful on the leader).
    pub fn cluster_progress(&self) -> String {
        self.membership.read().progress_line()
    }

    /// Printable membership view, e.g. `(follower1=localhost:5002)`.
    pub fn cluster_members(&self) -> String {
        self.membership.read().members_line()
    }
}
