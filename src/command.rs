//! Commands replicated through the log.
//!
//! A command is a single arithmetic step against a named variable:
//! assignment, addition, or subtraction of an integer literal. Commands print
//! in the compact form used by the log view, e.g. `(A=1)`, `(A+5)`, `(A-3)`.

use crate::error::RaftregError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The operation a command performs on its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOperation {
    Assign,
    Add,
    Subtract,
}

impl CommandOperation {
    /// Compact symbol used in the printable log.
    pub fn symbol(&self) -> &'static str {
        match self {
            CommandOperation::Assign => "=",
            CommandOperation::Add => "+",
            CommandOperation::Subtract => "-",
        }
    }

    /// Operation name used in state machine error messages.
    pub fn name(&self) -> &'static str {
        match self {
            CommandOperation::Assign => "Assign",
            CommandOperation::Add => "Add",
            CommandOperation::Subtract => "Subtract",
        }
    }
}

impl FromStr for CommandOperation {
    type Err = RaftregError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(CommandOperation::Assign),
            "+" | "plus" => Ok(CommandOperation::Add),
            "-" | "minus" => Ok(CommandOperation::Subtract),
            other => Err(RaftregError::UnknownOperation(other.to_string())),
        }
    }
}

impl std::fmt::Display for CommandOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single replicated command: `variable op literal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub variable: String,
    pub operation: CommandOperation,
    pub literal: i64,
}

impl Command {
    pub fn new(variable: impl Into<String>, operation: CommandOperation, literal: i64) -> Self {
        Self {
            variable: variable.into(),
            operation,
            literal,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}{}{})", self.variable, self.operation, self.literal)
    }
}
