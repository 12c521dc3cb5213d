use serde::{Deserialize, Serialize};

use crate::codegen::instructions::SYSTEM_INSTRUCTIONS;
use crate::error::{CodegenError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Append-only turn history for a single session.
///
/// Seeded with the system instructions; afterwards every cycle appends one user turn
/// followed by one assistant turn. A user turn left unanswered (because the cycle failed)
/// stays in place, and the next user turn is still accepted so a retry can proceed.
#[derive(Debug, Clone)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::with_instructions(SYSTEM_INSTRUCTIONS)
    }

    pub fn with_instructions(instructions: &str) -> Self {
        Self {
            turns: vec![Turn::new(Role::System, instructions)],
        }
    }

    pub fn append_user(&mut self, text: &str) -> Result<()> {
        self.turns.push(Turn::new(Role::User, text));
        Ok(())
    }

    /// Append the answer to the most recent user turn.
    ///
    /// Fails when there is no user turn awaiting an answer.
    pub fn append_assistant(&mut self, text: &str) -> Result<()> {
        match self.last_exchange_role() {
            Some(Role::User) => {
                self.turns.push(Turn::new(Role::Assistant, text));
                Ok(())
            }
            _ => Err(CodegenError::InvalidState(
                "assistant turn appended without a pending user turn".to_string(),
            )),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    fn last_exchange_role(&self) -> Option<Role> {
        self.turns
            .iter()
            .rev()
            .map(Turn::role)
            .find(|role| *role != Role::System)
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
