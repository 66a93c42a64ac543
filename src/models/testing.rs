//! In-memory completion service for tests
//!
//! Every opened session and every send is recorded so tests can assert
//! exactly what the model would have seen.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::traits::{ChatSession, CompletionService};
use super::types::{SessionReply, TokenUsage};
use crate::utils::RemoteServiceError;

/// What one session received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedSession {
    pub instruction: String,
    pub sent: Vec<String>,
}

#[derive(Default)]
struct Script {
    sessions: Vec<RecordedSession>,
    failing_texts: HashSet<String>,
}

/// Replies `echo: <text>` unless told to fail
#[derive(Clone, Default)]
pub struct ScriptedService {
    script: Arc<Mutex<Script>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any send whose text equals `text` fails with a quota error
    pub fn fail_on(&self, text: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_texts
            .insert(text.to_string());
    }

    pub fn recover(&self) {
        self.script.lock().unwrap().failing_texts.clear();
    }

    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.script.lock().unwrap().sessions.clone()
    }

    pub fn last_session(&self) -> RecordedSession {
        self.sessions().last().cloned().unwrap_or_default()
    }

    pub fn total_sends(&self) -> usize {
        self.sessions().iter().map(|s| s.sent.len()).sum()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    fn open_session(
        &self,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatSession>, RemoteServiceError> {
        let mut script = self.script.lock().unwrap();
        script.sessions.push(RecordedSession {
            instruction: system_instruction.to_string(),
            sent: Vec::new(),
        });
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
            index: script.sessions.len() - 1,
            instruction: system_instruction.to_string(),
        }))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
    index: usize,
    instruction: String,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    fn system_instruction(&self) -> &str {
        &self.instruction
    }

    async fn send(&mut self, text: &str) -> Result<SessionReply, RemoteServiceError> {
        let mut script = self.script.lock().unwrap();
        script.sessions[self.index].sent.push(text.to_string());

        if script.failing_texts.contains(text) {
            return Err(RemoteServiceError::quota("scripted failure"));
        }

        Ok(SessionReply {
            text: format!("echo: {}", text),
            usage: Some(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
        })
    }
}
