// Gateway module for models - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod factory;
mod gemini;
mod traits;
mod types;

#[cfg(test)]
pub(crate) mod testing;

// Public re-exports - the ONLY way to access model functionality
pub use factory::ModelFactory;
pub use gemini::GeminiService;
pub use traits::{ChatSession, CompletionService};
pub use types::{ModelConfig, SessionReply, TokenUsage};

#[cfg(test)]
pub(crate) use traits::{MockChatSession, MockCompletionService};
