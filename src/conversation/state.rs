use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::persona::{Persona, PersonaCatalog};
use crate::constants::DEFAULT_INSTRUCTION;
use crate::utils::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Local>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Local::now(),
        }
    }
}

/// The instruction in force and every turn exchanged under it
///
/// Invariant: the transcript only ever holds turns produced after the last
/// instruction change. Both are updated inside the same `&mut self` call.
#[derive(Debug, Clone)]
pub struct ConversationState {
    instruction: String,
    persona_id: Option<String>,
    transcript: Vec<Turn>,
    generation: u64,
    /// Index of a user turn whose submit failed, until the next append
    failed_at: Option<usize>,
}

fn normalize(text: &str) -> String {
    if text.trim().is_empty() {
        DEFAULT_INSTRUCTION.to_string()
    } else {
        text.to_string()
    }
}

impl ConversationState {
    pub fn new(persona: &Persona) -> Self {
        Self {
            instruction: normalize(&persona.instruction),
            persona_id: Some(persona.id.clone()),
            transcript: Vec::new(),
            generation: 0,
            failed_at: None,
        }
    }

    /// Start from an ad-hoc instruction that is not in any catalog
    pub fn with_instruction(text: &str) -> Self {
        Self {
            instruction: normalize(text),
            persona_id: None,
            transcript: Vec::new(),
            generation: 0,
            failed_at: None,
        }
    }

    /// Replace the instruction. Returns `true` when it changed, in which case
    /// the transcript was discarded. Writing the current value again is a
    /// no-op.
    pub fn set_instruction(&mut self, text: &str) -> bool {
        let text = normalize(text);
        if text == self.instruction {
            return false;
        }

        debug!(
            discarded_turns = self.transcript.len(),
            "Instruction changed, resetting transcript"
        );
        self.instruction = text;
        self.persona_id = None;
        self.reset_transcript();
        true
    }

    /// Resolve `id` and apply its instruction. Unknown ids change nothing.
    pub fn select_persona(
        &mut self,
        catalog: &PersonaCatalog,
        id: &str,
    ) -> Result<bool, ValidationError> {
        let persona = catalog.lookup(id)?;
        let changed = self.set_instruction(&persona.instruction);
        self.persona_id = Some(persona.id.clone());
        Ok(changed)
    }

    pub fn append_turn(&mut self, role: Role, content: &str) -> Result<(), ValidationError> {
        if role == Role::User && content.trim().is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        self.transcript.push(Turn::new(role, content));
        self.failed_at = None;
        Ok(())
    }

    /// Flag the newest turn as unanswered after a failed submit
    pub fn mark_failed(&mut self) {
        if let Some(turn) = self.transcript.last() {
            if turn.role == Role::User {
                self.failed_at = Some(self.transcript.len() - 1);
            }
        }
    }

    /// Empty the transcript but keep the instruction
    pub fn clear(&mut self) {
        self.reset_transcript();
    }

    /// Remove the newest turn if it is a user turn awaiting a reply
    pub fn pop_unanswered(&mut self) -> Option<Turn> {
        match self.transcript.last() {
            Some(turn) if turn.role == Role::User => {
                self.failed_at = None;
                self.transcript.pop()
            }
            _ => None,
        }
    }

    fn reset_transcript(&mut self) {
        self.transcript.clear();
        self.failed_at = None;
        self.generation += 1;
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn persona_id(&self) -> Option<&str> {
        self.persona_id.as_deref()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Bumped every time the transcript is emptied
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A user turn that never got a reply: either it is followed by another
    /// user turn, or it is the newest turn and its submit failed.
    pub fn is_orphaned(&self, index: usize) -> bool {
        match (self.transcript.get(index), self.transcript.get(index + 1)) {
            (Some(turn), Some(next)) => turn.role == Role::User && next.role == Role::User,
            (Some(turn), None) => turn.role == Role::User && self.failed_at == Some(index),
            _ => false,
        }
    }

    pub fn orphaned_count(&self) -> usize {
        (0..self.transcript.len())
            .filter(|&i| self.is_orphaned(i))
            .count()
    }
}
