//! Per-node volatile Raft state.
//!
//! [`NodeState`] is owned by exactly one node and guarded by that node's
//! single lock; every read-modify-write sequence on it happens under the
//! node's state lock. Role, term, and vote fields are mutated only through
//! the transition and handler methods here and in [`crate::node`].

use crate::command::Command;
use crate::error::RaftregError;
use crate::log::{LogEntry, ReplicationLog};
use crate::state_machine::{State, StateMachine};
use crate::types::{LogIndex, NodeInfo, Term};
use std::str::FromStr;
use tracing::info;

/// The three Raft roles. A node cycles among them for its entire lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, Role::Follower)
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self, Role::Candidate)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "Follower"),
            Role::Candidate => write!(f, "Candidate"),
            Role::Leader => write!(f, "Leader"),
        }
    }
}

impl FromStr for Role {
    type Err = RaftregError;

    /// Parse a startup role. A node may only be configured as leader or
    /// follower; candidacy is reached solely through timer expiry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leader" => Ok(Role::Leader),
            "follower" => Ok(Role::Follower),
            other => Err(RaftregError::UnknownRole(other.to_string())),
        }
    }
}

/// A node's complete volatile state: role, term, vote record, leader
/// identity, commit/apply cursors, and the embedded log and state machine.
#[derive(Debug)]
pub struct NodeState {
    pub name: String,
    pub role: Role,
    pub current_term: Term,
    pub voted_for: Option<String>,
    pub last_vote_term: Term,
    pub leader_info: Option<NodeInfo>,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub log: ReplicationLog,
    machine: StateMachine,
}

impl NodeState {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            current_term: 0,
            voted_for: None,
            last_vote_term: -1,
            leader_info: None,
            commit_index: -1,
            last_applied: -1,
            log: ReplicationLog::new(),
            machine: StateMachine::new(),
        }
    }

    /// Append a client command to the log under the current term.
    pub fn append_command(&mut self, command: Command) {
        let term = self.current_term;
        self.log.append(LogEntry::new(command, term));
    }

    /// Switch to leader. Vote state clears on this transition so a later
    /// candidacy starts from a clean slate.
    pub fn set_leader(&mut self, own_info: NodeInfo, term: Term) {
        self.role = Role::Leader;
        self.current_term = term;
        self.leader_info = Some(own_info);
        self.clear_vote();
        info!(node = %self.name, term, "became leader");
    }

    /// Switch to follower under the given leader (or none, after a lost
    /// election). Clears vote state.
    pub fn set_follower(&mut self, leader: Option<NodeInfo>, term: Term) {
        self.role = Role::Follower;
        self.current_term = term;
        self.leader_info = leader;
        self.clear_vote();
        info!(node = %self.name, term, leader = ?self.leader_info.as_ref().map(|l| &l.name), "became follower");
    }

    /// Switch to candidate, incrementing the term. Vote state is *not*
    /// cleared here: the single-vote-per-term guard must survive a failed
    /// election within the same term.
    pub fn set_candidate(&mut self) -> Term {
        self.role = Role::Candidate;
        self.current_term += 1;
        self.leader_info = None;
        info!(node = %self.name, term = self.current_term, "became candidate");
        self.current_term
    }

    fn clear_vote(&mut self) {
        self.voted_for = None;
        self.last_vote_term = -1;
    }

    /// Record a granted vote for the current term.
    pub fn record_vote(&mut self, candidate: impl Into<String>) {
        self.voted_for = Some(candidate.into());
        self.last_vote_term = self.current_term;
    }

    /// Raise the commit index from a leader's `leader_commit`, capped at the
    /// end of the local log. Never lowers it.
    pub fn observe_leader_commit(&mut self, leader_commit: LogIndex) {
        if leader_commit > self.commit_index {
            let new_commit = leader_commit.min(self.log.last_index());
            if new_commit > self.commit_index {
                info!(
                    node = %self.name,
                    from = self.commit_index,
                    to = new_commit,
                    "advancing commit index from leader"
                );
                self.commit_index = new_commit;
            }
        }
    }

    /// Apply all committed-but-unapplied entries to the state machine, one at
    /// a time in index order, and return the resulting state.
    pub fn apply_committed(&mut self) -> State {
        while self.last_applied < self.commit_index {
            self.last_applied += 1;
            if let Some(entry) = self.log.get(self.last_applied) {
                let command = entry.command.clone();
                self.machine.apply_commands(std::slice::from_ref(&command));
            }
        }
        self.machine.current().clone()
    }

    /// Current state machine output without applying anything.
    pub fn machine_state(&self) -> State {
        self.machine.current().clone()
    }

    /// Debug view of the node's cursors, e.g. `commitIndex=0, term=1, lastApplied=0`.
    pub fn status_line(&self) -> String {
        format!(
            "commitIndex={}, term={}, lastApplied={}",
            self.commit_index, self.current_term, self.last_applied
        )
    }
}
