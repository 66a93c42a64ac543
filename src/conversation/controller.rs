use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::persona::PersonaCatalog;
use super::policy::OrphanPolicy;
use super::replay::ContextReplayer;
use super::state::{ConversationState, Role, Turn};
use crate::models::{CompletionService, TokenUsage};
use crate::utils::{ChatError, RemoteServiceError, ValidationError};

/// Inbound events from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    PersonaSelected(String),
    InstructionEdited(String),
    UserSubmit(String),
    ClearRequested,
}

/// Outbound notices for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    TurnFailed {
        prompt: String,
        error: RemoteServiceError,
        policy: OrphanPolicy,
    },
    ConversationReset {
        persona_id: Option<String>,
        discarded: usize,
    },
    TranscriptCleared {
        discarded: usize,
    },
}

/// Result of a successful submit
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub replayed: usize,
    pub usage: Option<TokenUsage>,
}

/// What `handle` did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Instruction handled; `true` when the transcript was reset
    InstructionApplied(bool),
    Replied(TurnOutcome),
    Cleared,
}

/// Clears the in-flight flag however the submission ends
///
/// `submit` holds `&mut self` for the whole turn, so the flag only trips on
/// re-entry from inside a running turn. Callers that share a controller
/// across tasks serialize through their own lock and disable input while a
/// reply is pending.
struct InFlight<'a>(&'a mut bool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Runs user interactions against one conversation
pub struct TurnController {
    state: ConversationState,
    catalog: PersonaCatalog,
    service: Box<dyn CompletionService>,
    replayer: ContextReplayer,
    orphan_policy: OrphanPolicy,
    in_flight: bool,
    notifier: Option<UnboundedSender<Notification>>,
}

impl TurnController {
    pub fn new(
        catalog: PersonaCatalog,
        state: ConversationState,
        service: Box<dyn CompletionService>,
    ) -> Self {
        Self {
            state,
            catalog,
            service,
            replayer: ContextReplayer::default(),
            orphan_policy: OrphanPolicy::default(),
            in_flight: false,
            notifier: None,
        }
    }

    pub fn with_replayer(mut self, replayer: ContextReplayer) -> Self {
        self.replayer = replayer.with_orphan_policy(self.orphan_policy);
        self
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self.replayer = std::mem::take(&mut self.replayer).with_orphan_policy(policy);
        self
    }

    pub fn with_notifier(mut self, notifier: UnboundedSender<Notification>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Dispatch one presentation-layer event
    pub async fn handle(&mut self, event: ConversationEvent) -> Result<EventOutcome, ChatError> {
        match event {
            ConversationEvent::PersonaSelected(id) => self
                .select_persona(&id)
                .map(EventOutcome::InstructionApplied)
                .map_err(ChatError::from),
            ConversationEvent::InstructionEdited(text) => {
                Ok(EventOutcome::InstructionApplied(self.set_instruction(&text)))
            }
            ConversationEvent::UserSubmit(text) => self.submit(&text).await.map(EventOutcome::Replied),
            ConversationEvent::ClearRequested => {
                self.clear();
                Ok(EventOutcome::Cleared)
            }
        }
    }

    /// Run one full turn: record the user message, rebuild context, ask the
    /// model, record the reply
    pub async fn submit(&mut self, text: &str) -> Result<TurnOutcome, ChatError> {
        if self.in_flight {
            return Err(ValidationError::Busy.into());
        }
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyInput.into());
        }

        self.state.append_turn(Role::User, text)?;

        let result = {
            let _guard = InFlight::enter(&mut self.in_flight);
            self.replayer
                .answer(&self.state, self.service.as_ref())
                .await
        };

        match result {
            Ok(reply) => {
                self.state.append_turn(Role::Assistant, &reply.text)?;
                debug!(
                    replayed = reply.replayed,
                    turns = self.state.transcript().len(),
                    "Turn complete"
                );
                Ok(TurnOutcome {
                    reply: reply.text,
                    replayed: reply.replayed,
                    usage: reply.usage,
                })
            }
            Err(error) => {
                if self.orphan_policy == OrphanPolicy::Drop {
                    self.state.pop_unanswered();
                } else {
                    self.state.mark_failed();
                }
                self.notify(Notification::TurnFailed {
                    prompt: text.to_string(),
                    error: error.clone(),
                    policy: self.orphan_policy,
                });
                Err(error.into())
            }
        }
    }

    /// Switch to a catalog persona; `true` when the transcript was reset
    pub fn select_persona(&mut self, id: &str) -> Result<bool, ValidationError> {
        let discarded = self.state.transcript().len();
        let changed = self.state.select_persona(&self.catalog, id)?;
        if changed {
            info!(persona = id, "Persona selected");
            self.after_reset(discarded);
        }
        Ok(changed)
    }

    /// Apply a free-form instruction edit; `true` when the transcript was reset
    pub fn set_instruction(&mut self, text: &str) -> bool {
        let discarded = self.state.transcript().len();
        let changed = self.state.set_instruction(text);
        if changed {
            // Edited text may still match a preset verbatim
            if let Some(persona) = self.catalog.find_by_instruction(self.state.instruction()) {
                let id = persona.id.clone();
                let _ = self.state.select_persona(&self.catalog, &id);
            }
            info!("Instruction edited");
            self.after_reset(discarded);
        }
        changed
    }

    pub fn clear(&mut self) {
        let discarded = self.state.transcript().len();
        self.state.clear();
        self.replayer.invalidate();
        self.notify(Notification::TranscriptCleared { discarded });
    }

    fn after_reset(&mut self, discarded: usize) {
        self.replayer.invalidate();
        self.notify(Notification::ConversationReset {
            persona_id: self.state.persona_id().map(str::to_string),
            discarded,
        });
    }

    fn notify(&self, notification: Notification) {
        if let Some(tx) = &self.notifier {
            // A closed channel only means nobody is listening any more
            let _ = tx.send(notification);
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        self.state.transcript()
    }

    pub fn instruction(&self) -> &str {
        self.state.instruction()
    }

    pub fn persona_id(&self) -> Option<&str> {
        self.state.persona_id()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn catalog(&self) -> &PersonaCatalog {
        &self.catalog
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    pub fn replayer(&self) -> &ContextReplayer {
        &self.replayer
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::policy::ReplayMode;
    use crate::models::testing::ScriptedService;
    use crate::utils::RemoteErrorKind;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn controller(service: &ScriptedService) -> TurnController {
        let catalog = PersonaCatalog::builtin();
        let state = ConversationState::new(catalog.lookup("default").unwrap());
        TurnController::new(catalog, state, Box::new(service.clone()))
    }

    fn transcript(controller: &TurnController) -> Vec<(Role, String)> {
        controller
            .transcript()
            .iter()
            .map(|t| (t.role, t.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_first_submit() {
        let service = ScriptedService::new();
        let mut chat = controller(&service);

        let outcome = chat.submit("Hi").await.unwrap();

        assert_eq!(outcome.replayed, 0);
        assert_eq!(
            transcript(&chat),
            vec![
                (Role::User, "Hi".to_string()),
                (Role::Assistant, "echo: Hi".to_string())
            ]
        );
        assert_eq!(service.last_session().instruction, "You are a helpful assistant.");
    }

    #[tokio::test]
    async fn test_second_submit_replays_history() {
        let service = ScriptedService::new();
        let mut chat = controller(&service);

        chat.submit("Hi").await.unwrap();
        let outcome = chat.submit("How are you?").await.unwrap();

        assert_eq!(outcome.replayed, 2);
        let sent = service.last_session().sent;
        assert_eq!(sent.first().map(String::as_str), Some("Hi"));
        assert_eq!(sent.last().map(String::as_str), Some("How are you?"));
        assert_eq!(chat.transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_persona_change_resets() {
        let service = ScriptedService::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut chat = controller(&service).with_notifier(tx);

        chat.submit("Hi").await.unwrap();
        chat.submit("How are you?").await.unwrap();
        assert!(chat.select_persona("tamil-tutor").unwrap());

        assert!(chat.transcript().is_empty());
        assert_eq!(
            chat.instruction(),
            chat.catalog().lookup("tamil-tutor").unwrap().instruction
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ConversationReset {
                persona_id: Some("tamil-tutor".to_string()),
                discarded: 4
            }
        );

        chat.submit("Vanakkam").await.unwrap();
        assert!(service.last_session().instruction.contains("Tamil"));
        assert_eq!(service.last_session().sent, vec!["Vanakkam"]);
    }

    #[tokio::test]
    async fn test_empty_submit_rejected() {
        let service = ScriptedService::new();
        let mut chat = controller(&service);

        let err = chat.submit("").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(ValidationError::EmptyInput)));
        let err = chat.submit("   ").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(ValidationError::EmptyInput)));

        assert!(chat.transcript().is_empty());
        assert!(service.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_orphan() {
        let service = ScriptedService::new();
        service.fail_on("test");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut chat = controller(&service).with_notifier(tx);

        let err = chat.submit("test").await.unwrap_err();

        assert!(matches!(err, ChatError::Remote(ref e) if e.kind == RemoteErrorKind::Quota));
        assert!(!err.is_fatal());
        assert_eq!(transcript(&chat), vec![(Role::User, "test".to_string())]);
        assert!(chat.state().is_orphaned(0));
        assert!(!chat.is_busy());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Notification::TurnFailed { ref prompt, policy: OrphanPolicy::Keep, .. } if prompt == "test"
        ));
    }

    #[tokio::test]
    async fn test_orphan_resent_on_next_success() {
        let service = ScriptedService::new();
        service.fail_on("test");
        let mut chat = controller(&service);

        assert!(chat.submit("test").await.is_err());
        service.recover();
        let outcome = chat.submit("next").await.unwrap();

        assert_eq!(outcome.replayed, 1);
        assert_eq!(service.last_session().sent, vec!["test", "next"]);
        assert_eq!(chat.state().orphaned_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_policy_removes_orphan() {
        let service = ScriptedService::new();
        service.fail_on("test");
        let mut chat = controller(&service).with_orphan_policy(OrphanPolicy::Drop);

        chat.submit("Hi").await.unwrap();
        assert!(chat.submit("test").await.is_err());
        assert_eq!(chat.transcript().len(), 2);
        assert_eq!(chat.state().orphaned_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_policy_hides_orphan_from_replay() {
        let service = ScriptedService::new();
        service.fail_on("test");
        let mut chat = controller(&service).with_orphan_policy(OrphanPolicy::Skip);

        assert!(chat.submit("test").await.is_err());
        service.recover();
        let outcome = chat.submit("next").await.unwrap();

        assert_eq!(outcome.replayed, 0);
        assert_eq!(service.last_session().sent, vec!["next"]);
        assert_eq!(chat.transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_busy_rejected() {
        let service = ScriptedService::new();
        let mut chat = controller(&service);
        chat.in_flight = true;

        let err = chat.submit("Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(ValidationError::Busy)));
        assert!(chat.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_redundant_instruction_write_does_not_reset() {
        let service = ScriptedService::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut chat = controller(&service).with_notifier(tx);

        chat.submit("Hi").await.unwrap();
        assert!(!chat.set_instruction("You are a helpful assistant."));
        assert!(!chat.select_persona("default").unwrap());

        assert_eq!(chat.transcript().len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_edited_instruction_matching_preset_records_persona() {
        let service = ScriptedService::new();
        let mut chat = controller(&service);
        let hindi = chat.catalog().lookup("hindi-tutor").unwrap().instruction.clone();

        assert!(chat.set_instruction("You are a friendly pirate"));
        assert_eq!(chat.persona_id(), None);

        assert!(chat.set_instruction(&hindi));
        assert_eq!(chat.persona_id(), Some("hindi-tutor"));
    }

    #[tokio::test]
    async fn test_events() {
        let service = ScriptedService::new();
        let mut chat = controller(&service);

        let outcome = chat
            .handle(ConversationEvent::UserSubmit("Hi".to_string()))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Replied(ref o) if o.reply == "echo: Hi"));

        let outcome = chat.handle(ConversationEvent::ClearRequested).await.unwrap();
        assert_eq!(outcome, EventOutcome::Cleared);
        assert!(chat.transcript().is_empty());
        assert_eq!(chat.persona_id(), Some("default"));

        let err = chat
            .handle(ConversationEvent::PersonaSelected("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation(ValidationError::UnknownPersona(_))
        ));

        let outcome = chat
            .handle(ConversationEvent::InstructionEdited(
                "Respond only in haikus".to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::InstructionApplied(true));
        assert_eq!(chat.instruction(), "Respond only in haikus");
    }

    #[tokio::test]
    async fn test_persistent_mode_through_controller() {
        let service = ScriptedService::new();
        let mut chat = controller(&service).with_replayer(ContextReplayer::new(
            ReplayMode::Persistent,
            "(assistant previously said) ",
        ));

        chat.submit("one").await.unwrap();
        chat.submit("two").await.unwrap();
        chat.clear();
        chat.submit("three").await.unwrap();

        let sessions = service.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].sent, vec!["one", "two"]);
        assert_eq!(sessions[1].sent, vec!["three"]);
    }
}
