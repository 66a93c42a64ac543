use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

/// Configuration for model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub top_p: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            top_p: None,
        }
    }
}

/// Reply to a single send within a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReply {
    /// The generated text
    pub text: String,
    /// Usage statistics if available
    pub usage: Option<TokenUsage>,
}

impl SessionReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Sum two usage records; replayed sends add up to the cost of a turn
    pub fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}
