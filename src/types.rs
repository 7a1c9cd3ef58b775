//! Core type definitions shared across the crate.
//!
//! Terms and log indices are signed: `-1` is a first-class sentinel meaning
//! "before the log" (no entry, no term, nothing committed or applied yet).
//! All log positions are 0-based.

use serde::{Deserialize, Serialize};

/// A logical election epoch. Strictly increases on every new election.
pub type Term = i64;

/// A 0-based position in the replication log.
pub type LogIndex = i64;

/// Network location of a node, as seen by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A node's identity: its cluster-unique name plus where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub address: NodeAddress,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, address: NodeAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.name, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_displays_as_host_port() {
        let addr = NodeAddress::new("localhost", 5001);
        assert_eq!(addr.to_string(), "localhost:5001");
    }

    #[test]
    fn node_info_displays_name_and_address() {
        let info = NodeInfo::new("leader1", NodeAddress::new("localhost", 5001));
        assert_eq!(info.to_string(), "leader1 at localhost:5001");
    }
}
