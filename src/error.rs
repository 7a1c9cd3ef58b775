//! Error types for raftreg.
//!
//! A single [`RaftregError`] enum covers the crate, with a [`Result`] alias.
//! Peer-level failures (unreachable, timed out) are retryable: the next
//! heartbeat or replication cycle picks the peer up again. Configuration
//! errors are fatal at construction.

use thiserror::Error;

/// Main error type for raftreg operations.
#[derive(Error, Debug)]
pub enum RaftregError {
    #[error("not the leader; known leader: {leader:?}")]
    NotLeader { leader: Option<String> },

    #[error("leader unknown")]
    LeaderUnknown,

    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("rpc to {0} timed out")]
    RpcTimeout(String),

    #[error("node is disconnected from the cluster")]
    Disconnected,

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl RaftregError {
    /// Whether the failed operation can be retried on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RaftregError::PeerUnreachable { .. }
                | RaftregError::RpcTimeout(_)
                | RaftregError::LeaderUnknown
        )
    }
}

/// Result type alias for raftreg operations.
pub type Result<T> = std::result::Result<T, RaftregError>;
