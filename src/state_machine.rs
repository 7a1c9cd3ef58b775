//! The replicated state machine: a named-variable arithmetic store.
//!
//! Commands are applied in log order. Assignment sets a variable
//! unconditionally; addition and subtraction require a prior assignment and
//! otherwise accumulate an error instead of changing anything. Identical
//! command sequences produce identical [`State`] on every node.

use crate::command::{Command, CommandOperation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Observable output of the state machine: the last value written or updated,
/// plus any arithmetic-on-unassigned-variable errors accumulated so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub value: i64,
    pub errors: Vec<String>,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            write!(f, "value={}", self.value)
        } else {
            write!(f, "value={}, errors=[{}]", self.value, self.errors.join("; "))
        }
    }
}

/// Deterministic interpreter of committed commands.
#[derive(Debug, Default)]
pub struct StateMachine {
    variables: HashMap<String, i64>,
    state: State,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of committed commands, in order, mutating the shared state.
    pub fn apply_commands(&mut self, commands: &[Command]) -> &State {
        for command in commands {
            self.apply(command);
        }
        &self.state
    }

    fn apply(&mut self, command: &Command) {
        match command.operation {
            CommandOperation::Assign => {
                self.variables
                    .insert(command.variable.clone(), command.literal);
                self.state.value = command.literal;
            }
            CommandOperation::Add | CommandOperation::Subtract => {
                match self.variables.get_mut(&command.variable) {
                    Some(value) => {
                        if command.operation == CommandOperation::Add {
                            *value += command.literal;
                        } else {
                            *value -= command.literal;
                        }
                        self.state.value = *value;
                    }
                    None => self.state.errors.push(format!(
                        "Tried to do arithmetic operation {} on unassigned variable {}.",
                        command.operation.name(),
                        command.variable
                    )),
                }
            }
        }
    }

    /// The current state, as of the last applied command.
    pub fn current(&self) -> &State {
        &self.state
    }
}
