use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::app::UIConfig;
use crate::constants::{DEFAULT_PERSONA_ID, UI_DEFAULT_VIEWPORT_HEIGHT};
use crate::conversation::{
    ConversationState, Notification, OrphanPolicy, Persona, TurnController, TurnOutcome,
};
use crate::utils::{log_warn, ChatError};

/// Application state for different modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Normal mode - scrolling, persona cycling
    Normal,
    /// Insert mode - typing input
    Insert,
    /// Command mode - entering commands
    Command,
}

type TurnResult = Result<TurnOutcome, ChatError>;

/// Application state
pub struct App {
    controller: Arc<Mutex<TurnController>>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    turn_tx: mpsc::UnboundedSender<TurnResult>,
    turn_rx: mpsc::UnboundedReceiver<TurnResult>,
    /// Copy of the conversation taken after every change, so rendering never
    /// waits on a running turn
    pub view: ConversationState,
    /// Persona catalog in display order
    pub personas: Vec<Persona>,
    /// User input buffer
    pub input: String,
    /// Is the app running?
    pub running: bool,
    /// Message submitted and awaiting its reply
    pub pending_prompt: Option<String>,
    /// Is model currently generating?
    pub is_generating: bool,
    /// Scroll offset for chat view
    pub scroll_offset: u16,
    /// Show persona sidebar
    pub show_sidebar: bool,
    /// Render assistant turns as markdown
    pub render_markdown: bool,
    /// Model name for display
    pub model_name: String,
    pub orphan_policy: OrphanPolicy,
    /// Replayed message count of the last successful turn
    pub last_replayed: Option<usize>,
    /// Status message
    pub status_message: Option<String>,
    /// Lines shown in the chat pane below the transcript (help, persona list)
    pub info_lines: Vec<String>,
}

impl App {
    /// Create a new app instance
    pub fn new(
        controller: TurnController,
        notifications: mpsc::UnboundedReceiver<Notification>,
        ui: &UIConfig,
    ) -> Self {
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();

        Self {
            view: controller.state().clone(),
            personas: controller.catalog().personas().to_vec(),
            model_name: controller.model_name().to_string(),
            orphan_policy: controller.orphan_policy(),
            controller: Arc::new(Mutex::new(controller)),
            notifications,
            turn_tx,
            turn_rx,
            input: String::new(),
            running: true,
            pending_prompt: None,
            is_generating: false,
            scroll_offset: 0,
            show_sidebar: ui.show_sidebar,
            render_markdown: ui.render_markdown,
            last_replayed: None,
            status_message: None,
            info_lines: Vec::new(),
        }
    }

    /// Label of the active persona, or "Custom" for a free-form instruction
    pub fn persona_label(&self) -> &str {
        self.view
            .persona_id()
            .and_then(|id| self.personas.iter().find(|p| p.id == id))
            .map(|p| p.label.as_str())
            .unwrap_or("Custom")
    }

    /// Send the input buffer as a user turn on a background task
    pub fn submit_input(&mut self) {
        if self.is_generating {
            self.set_status("Still waiting for the previous reply");
            return;
        }
        if self.input.trim().is_empty() {
            return;
        }

        let text = std::mem::take(&mut self.input);
        self.info_lines.clear();
        self.pending_prompt = Some(text.clone());
        self.is_generating = true;
        self.scroll_offset = 0;

        let controller = Arc::clone(&self.controller);
        let tx = self.turn_tx.clone();
        tokio::spawn(async move {
            let result = controller.lock().await.submit(&text).await;
            let _ = tx.send(result);
        });
    }

    /// Pick up a finished turn, if any
    pub async fn poll_turn(&mut self) {
        if let Ok(result) = self.turn_rx.try_recv() {
            self.finish_turn(result).await;
        }
    }

    async fn finish_turn(&mut self, result: TurnResult) {
        self.is_generating = false;
        self.pending_prompt = None;
        match result {
            Ok(outcome) => {
                self.last_replayed = Some(outcome.replayed);
                self.clear_status();
            }
            // The TurnFailed notification carries the status text
            Err(e) => log_warn("⚠️", format!("Turn failed: {}", e)),
        }
        self.refresh().await;
        self.scroll_offset = 0;
    }

    /// Turn controller notices into status text
    pub fn drain_notifications(&mut self) {
        while let Ok(notice) = self.notifications.try_recv() {
            let message = match notice {
                Notification::TurnFailed { error, policy, .. } => match policy {
                    OrphanPolicy::Keep => format!("✗ {} (message kept, it will be resent)", error),
                    OrphanPolicy::Drop => format!("✗ {} (message dropped)", error),
                    OrphanPolicy::Skip => format!("✗ {} (message kept, not resent)", error),
                },
                Notification::ConversationReset {
                    persona_id,
                    discarded,
                } => format!(
                    "Persona: {} ({} messages cleared)",
                    persona_id.as_deref().unwrap_or("custom"),
                    discarded
                ),
                Notification::TranscriptCleared { discarded } => {
                    format!("Chat cleared ({} messages)", discarded)
                }
            };
            self.set_status(message);
        }
    }

    /// Re-copy the conversation from the controller
    pub async fn refresh(&mut self) {
        let controller = self.controller.lock().await;
        self.view = controller.state().clone();
    }

    fn guard_busy(&mut self) -> bool {
        if self.is_generating {
            self.set_status("Wait for the reply before changing the conversation");
            true
        } else {
            false
        }
    }

    pub async fn select_persona(&mut self, id: &str) {
        if self.guard_busy() {
            return;
        }
        let result = self.controller.lock().await.select_persona(id);
        match result {
            Ok(true) => self.after_reset(),
            Ok(false) => self.set_status(format!("Already using {}", id)),
            Err(e) => self.set_status(format!("✗ {}", e)),
        }
        self.refresh().await;
        self.drain_notifications();
    }

    /// Step through the catalog; a custom instruction starts from the top
    pub async fn cycle_persona(&mut self, forward: bool) {
        if self.personas.is_empty() {
            return;
        }
        let len = self.personas.len();
        let current = self
            .view
            .persona_id()
            .and_then(|id| self.personas.iter().position(|p| p.id == id));
        let next = match (current, forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
            (None, true) => 0,
            (None, false) => len - 1,
        };
        let id = self.personas[next].id.clone();
        self.select_persona(&id).await;
    }

    pub async fn set_instruction(&mut self, text: &str) {
        if self.guard_busy() {
            return;
        }
        let changed = self.controller.lock().await.set_instruction(text);
        if changed {
            self.after_reset();
        } else {
            self.set_status("Instruction unchanged");
        }
        self.refresh().await;
        self.drain_notifications();
    }

    pub async fn reset(&mut self) {
        self.select_persona(DEFAULT_PERSONA_ID).await;
    }

    pub async fn clear(&mut self) {
        if self.guard_busy() {
            return;
        }
        self.controller.lock().await.clear();
        self.last_replayed = None;
        self.info_lines.clear();
        self.scroll_offset = 0;
        self.refresh().await;
        self.drain_notifications();
    }

    fn after_reset(&mut self) {
        self.last_replayed = None;
        self.info_lines.clear();
        self.scroll_offset = 0;
    }

    pub fn show_info(&mut self, lines: Vec<String>) {
        self.info_lines = lines;
        self.scroll_offset = 0;
    }

    /// Toggle sidebar visibility
    pub fn toggle_sidebar(&mut self) {
        self.show_sidebar = !self.show_sidebar;
    }

    /// Set status message
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Clear status message
    pub fn clear_status(&mut self) {
        self.status_message = None;
    }

    /// Scroll chat view up
    pub fn scroll_up(&mut self, amount: u16) {
        // Role line, content lines and a blank separator per turn
        let mut total_lines = 0u16;
        for turn in self.view.transcript() {
            total_lines = total_lines
                .saturating_add(2)
                .saturating_add(turn.content.lines().count() as u16);
        }
        total_lines = total_lines.saturating_add(self.info_lines.len() as u16);
        if self.pending_prompt.is_some() {
            total_lines = total_lines.saturating_add(4);
        }

        let max_scroll = total_lines.saturating_sub(UI_DEFAULT_VIEWPORT_HEIGHT);
        self.scroll_offset = self.scroll_offset.saturating_add(amount).min(max_scroll);
    }

    /// Scroll chat view down
    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    /// Quit the application
    pub fn quit(&mut self) {
        self.running = false;
    }
}
