use async_trait::async_trait;

use super::types::SessionReply;
use crate::utils::RemoteServiceError;

/// A conversation opened against the completion service
///
/// The session keeps whatever context the provider needs between sends.
/// Prior model output cannot be injected directly, only sent outbound.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatSession: Send {
    /// The system instruction this session was opened with
    fn system_instruction(&self) -> &str;

    /// Send one message and wait for the reply
    async fn send(&mut self, text: &str) -> Result<SessionReply, RemoteServiceError>;
}

/// Core trait that all completion backends must implement
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Open a new session scoped to `system_instruction`
    fn open_session(
        &self,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatSession>, RemoteServiceError>;

    /// Get the name of the model
    fn model_name(&self) -> &str;

    /// Validate that the service is reachable with the configured credential
    async fn validate_connection(&self) -> Result<bool, RemoteServiceError> {
        Ok(true)
    }
}
