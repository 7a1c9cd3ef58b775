//! Leader-side view of the cluster: peer addresses and replication progress.
//!
//! For every known peer the leader tracks `next_index` (where the next
//! AppendEntries batch starts) and `match_index` (highest index confirmed
//! replicated, `-1` for "unknown"). Progress is rebuilt whenever a node
//! becomes leader; it is only this leader's estimate, never shared state.

use crate::types::{LogIndex, NodeAddress, NodeInfo};
use std::collections::BTreeMap;

/// Replication progress for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerProgress {
    pub next_index: LogIndex,
    pub match_index: LogIndex,
}

impl Default for PeerProgress {
    fn default() -> Self {
        Self {
            next_index: 0,
            match_index: -1,
        }
    }
}

/// All peers known to this node, keyed by name for deterministic iteration.
#[derive(Debug, Default)]
pub struct ClusterMembership {
    peers: BTreeMap<String, (NodeAddress, PeerProgress)>,
}

impl ClusterMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a peer, starting its progress from scratch. Returns the
    /// human-readable registration message.
    pub fn add_peer(&mut self, name: impl Into<String>, address: NodeAddress) -> String {
        let name = name.into();
        let message = format!("{} added at {}", name, address);
        self.peers.insert(name, (address, PeerProgress::default()));
        message
    }

    pub fn contains(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Snapshot of all known peers.
    pub fn peers(&self) -> Vec<NodeInfo> {
        self.peers
            .iter()
            .map(|(name, (address, _))| NodeInfo::new(name.clone(), address.clone()))
            .collect()
    }

    pub fn next_index(&self, name: &str) -> LogIndex {
        self.peers
            .get(name)
            .map(|(_, progress)| progress.next_index)
            .unwrap_or(0)
    }

    pub fn match_index(&self, name: &str) -> LogIndex {
        self.peers
            .get(name)
            .map(|(_, progress)| progress.match_index)
            .unwrap_or(-1)
    }

    /// A successful AppendEntries reply: advance `next_index` by the number
    /// of entries that were sent and confirm everything before it.
    pub fn record_success(&mut self, name: &str, entries_sent: LogIndex) {
        if let Some((_, progress)) = self.peers.get_mut(name) {
            progress.next_index += entries_sent;
            progress.match_index = progress.next_index - 1;
        }
    }

    /// A rejected AppendEntries reply: back off one entry and retry with an
    /// earlier prev_log_index next cycle. `match_index` stays untouched.
    pub fn record_failure(&mut self, name: &str) {
        if let Some((_, progress)) = self.peers.get_mut(name) {
            progress.next_index = (progress.next_index - 1).max(0);
        }
    }

    /// Forget all progress, as a freshly promoted leader must.
    pub fn reset_progress(&mut self) {
        for (_, progress) in self.peers.values_mut() {
            *progress = PeerProgress::default();
        }
    }

    pub fn match_indexes(&self) -> Vec<LogIndex> {
        self.peers
            .values()
            .map(|(_, progress)| progress.match_index)
            .collect()
    }

    /// Debug view of per-peer next indices, e.g. `(follower1, 1),(follower2, 2)`.
    pub fn progress_line(&self) -> String {
        self.peers
            .iter()
            .map(|(name, (_, progress))| format!("({}, {})", name, progress.next_index))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Debug view of the membership itself, e.g. `(follower1=localhost:5002)`.
    pub fn members_line(&self) -> String {
        self.peers
            .iter()
            .map(|(name, (address, _))| format!("({}={})", name, address))
            .collect::<Vec<_>>()
            .join(",")
    }
}
