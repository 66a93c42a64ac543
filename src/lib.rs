pub mod app;
pub mod cli;
pub mod constants;
pub mod conversation;
pub mod models;
pub mod runtime;
pub mod tui;
pub mod utils;

pub use app::{load_config, Config};
pub use conversation::{ConversationState, PersonaCatalog, TurnController};
pub use models::{CompletionService, ModelFactory};
pub use tui::run_ui;
pub use utils::ChatError;
