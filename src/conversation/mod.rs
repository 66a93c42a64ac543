// Gateway module for the conversation core - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod controller;
mod persona;
mod policy;
mod replay;
mod state;

// Public re-exports - the ONLY way to access conversation functionality
pub use controller::{ConversationEvent, EventOutcome, Notification, TurnController, TurnOutcome};
pub use persona::{Persona, PersonaCatalog};
pub use policy::{OrphanPolicy, ReplayMode};
pub use replay::{ContextReplayer, Reply};
pub use state::{ConversationState, Role, Turn};
