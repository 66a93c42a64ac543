use tracing::{debug, warn};

use super::policy::{OrphanPolicy, ReplayMode};
use super::state::{ConversationState, Role};
use crate::constants::ASSISTANT_REPLAY_MARKER;
use crate::models::{ChatSession, CompletionService, TokenUsage};
use crate::utils::RemoteServiceError;

/// The answer to the newest user turn
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Prior turns resent before the live message
    pub replayed: usize,
    pub usage: Option<TokenUsage>,
}

/// A session kept alive between turns in persistent mode
struct CachedSession {
    generation: u64,
    /// Transcript turns the session already knows about
    seen: usize,
    session: Box<dyn ChatSession>,
}

/// Rebuilds model context from the transcript and asks for the next reply
pub struct ContextReplayer {
    mode: ReplayMode,
    marker: String,
    skip_orphans: bool,
    cached: Option<CachedSession>,
}

impl Default for ContextReplayer {
    fn default() -> Self {
        Self::new(ReplayMode::default(), ASSISTANT_REPLAY_MARKER)
    }
}

fn add_usage(total: Option<TokenUsage>, usage: Option<TokenUsage>) -> Option<TokenUsage> {
    match (total, usage) {
        (Some(a), Some(b)) => Some(a.add(b)),
        (a, b) => a.or(b),
    }
}

impl ContextReplayer {
    pub fn new(mode: ReplayMode, marker: impl Into<String>) -> Self {
        Self {
            mode,
            marker: marker.into(),
            skip_orphans: false,
            cached: None,
        }
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.skip_orphans = policy == OrphanPolicy::Skip;
        self
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    /// Forget any kept session
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// The outbound messages a fresh session receives before the live one
    pub fn replay_messages(&self, state: &ConversationState) -> Vec<String> {
        let transcript = state.transcript();
        let history = transcript.len().saturating_sub(1);

        transcript[..history]
            .iter()
            .enumerate()
            .filter(|(i, _)| !(self.skip_orphans && state.is_orphaned(*i)))
            .map(|(_, turn)| match turn.role {
                Role::User => turn.content.clone(),
                Role::Assistant => format!("{}{}", self.marker, turn.content),
            })
            .collect()
    }

    /// Answer the newest turn of `state`, which must be a user turn
    ///
    /// Never mutates the conversation; the caller appends the reply.
    pub async fn answer(
        &mut self,
        state: &ConversationState,
        service: &dyn CompletionService,
    ) -> Result<Reply, RemoteServiceError> {
        let live = match state.transcript().last() {
            Some(turn) if turn.role == Role::User => turn.content.clone(),
            _ => return Err(RemoteServiceError::invalid_request("nothing to answer")),
        };

        let result = match self.take_reusable(state) {
            Some(mut cached) => {
                debug!(seen = cached.seen, "Reusing session");
                let result = cached.session.send(&live).await;
                if result.is_ok() {
                    self.keep(state, cached.session);
                }
                result.map(|reply| Reply {
                    text: reply.text,
                    replayed: 0,
                    usage: reply.usage,
                })
            }
            None => self.answer_fresh(state, service, &live).await,
        };

        if let Err(e) = &result {
            warn!(kind = ?e.kind, "Turn failed: {}", e.message);
        }
        result
    }

    async fn answer_fresh(
        &mut self,
        state: &ConversationState,
        service: &dyn CompletionService,
        live: &str,
    ) -> Result<Reply, RemoteServiceError> {
        let mut session = service.open_session(state.instruction())?;
        let history = self.replay_messages(state);

        debug!(
            instruction_len = state.instruction().len(),
            replay = history.len(),
            "Replaying transcript into new session"
        );

        let mut usage = None;
        for message in &history {
            let reply = session.send(message).await?;
            usage = add_usage(usage, reply.usage);
        }

        let reply = session.send(live).await?;
        usage = add_usage(usage, reply.usage);

        self.keep(state, session);

        Ok(Reply {
            text: reply.text,
            replayed: history.len(),
            usage,
        })
    }

    /// Hand out the cached session if it matches the conversation exactly
    fn take_reusable(&mut self, state: &ConversationState) -> Option<CachedSession> {
        let cached = self.cached.take()?;
        let matches = cached.generation == state.generation()
            && cached.session.system_instruction() == state.instruction()
            && cached.seen + 1 == state.transcript().len();
        matches.then_some(cached)
    }

    fn keep(&mut self, state: &ConversationState, session: Box<dyn ChatSession>) {
        if self.mode != ReplayMode::Persistent {
            return;
        }
        // The session has seen the live turn and its own reply, which the
        // caller is about to append.
        self.cached = Some(CachedSession {
            generation: state.generation(),
            seen: state.transcript().len() + 1,
            session,
        });
    }
}
