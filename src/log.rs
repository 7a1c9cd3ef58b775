//! The replication log: an ordered, append-only sequence of commands.
//!
//! Indices are 0-based. Negative indices are not errors: they address the
//! position "before the log" and yield a term of `-1` / no entry, which is
//! exactly what the AppendEntries consistency check needs for an empty log.

use crate::command::Command;
use crate::types::{LogIndex, Term};
use serde::{Deserialize, Serialize};

/// A single entry: the command plus the term it was appended under.
/// Immutable once appended, except through [`ReplicationLog::remove_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub command: Command,
    pub term: Term,
}

impl LogEntry {
    pub fn new(command: Command, term: Term) -> Self {
        Self { command, term }
    }
}

/// The ordered command log of one node.
#[derive(Debug, Default)]
pub struct ReplicationLog {
    entries: Vec<LogEntry>,
}

impl ReplicationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, as a signed index-compatible count.
    pub fn len(&self) -> LogIndex {
        self.entries.len() as LogIndex
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry, or `-1` for an empty log.
    pub fn last_index(&self) -> LogIndex {
        self.len() - 1
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Term of the entry at `index`, or `-1` when the index is before the log
    /// or past its end.
    pub fn term_at(&self, index: LogIndex) -> Term {
        if index < 0 || index >= self.len() {
            return -1;
        }
        self.entries[index as usize].term
    }

    /// Entry at `index`, or `None` when out of range.
    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index < 0 || index >= self.len() {
            return None;
        }
        self.entries.get(index as usize)
    }

    /// Discard the contiguous suffix `entries[index..]`. Used only to resolve
    /// conflicts with a leader's authoritative log.
    pub fn remove_from(&mut self, index: LogIndex) {
        if index >= self.len() {
            return;
        }
        self.entries.truncate(index.max(0) as usize);
    }

    /// The last `count` entries (all of them if `count` exceeds the length,
    /// none for `count <= 0`).
    pub fn last_entries(&self, count: LogIndex) -> Vec<LogEntry> {
        if count <= 0 {
            return Vec::new();
        }
        let skip = (self.len() - count).max(0) as usize;
        self.entries[skip..].to_vec()
    }

    /// All entries from `index` to the end (the whole log for `index <= 0`).
    pub fn entries_from(&self, index: LogIndex) -> Vec<LogEntry> {
        if index >= self.len() {
            return Vec::new();
        }
        self.entries[index.max(0) as usize..].to_vec()
    }
}

impl std::fmt::Display for ReplicationLog {
    /// The ordered command view, e.g. `(A=1), (A+5)`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let printed: Vec<String> = self.entries.iter().map(|e| e.command.to_string()).collect();
        f.write_str(&printed.join(", "))
    }
}
