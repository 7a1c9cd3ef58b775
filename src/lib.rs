//! raftreg: a Raft-replicated arithmetic register.
//!
//! A cluster of nodes elects a leader, replicates a log of arithmetic
//! commands (`(A=1)`, `(A+5)`, `(B-3)`), and applies committed entries to a
//! deterministic state machine so every node converges on the same values.
//! Nodes join a running cluster by registering through any member, and can
//! be disconnected and reconnected to exercise partition behavior.
//!
//! The crate is transport-agnostic: nodes talk through the [`rpc::PeerClient`]
//! trait, and [`rpc::memory`] provides an in-process implementation used by
//! the integration tests.
//!
//! ```no_run
//! use raftreg::config::NodeConfig;
//! use raftreg::node::RaftNode;
//! use raftreg::rpc::memory::MemoryCluster;
//! use raftreg::state::Role;
//! use raftreg::types::NodeAddress;
//!
//! # async fn demo() -> raftreg::error::Result<()> {
//! let cluster = MemoryCluster::new();
//! let address = NodeAddress::new("localhost", 5001);
//! let config = NodeConfig::new("leader1", address.clone(), Role::Leader);
//! let leader = RaftNode::new(config, cluster.client_for(address))?;
//! cluster.add_node(leader.clone());
//! leader.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod election;
pub mod error;
pub mod log;
pub mod membership;
pub mod node;
pub mod replication;
pub mod rpc;
pub mod state;
pub mod state_machine;
pub mod timer;
pub mod types;

pub use command::{Command, CommandOperation};
pub use config::NodeConfig;
pub use error::{RaftregError, Result};
pub use node::RaftNode;
pub use state::Role;
pub use types::{LogIndex, NodeAddress, NodeInfo, Term};
