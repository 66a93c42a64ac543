use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    cli::OutputFormat,
    conversation::{OrphanPolicy, ReplayMode, TurnController},
    models::TokenUsage,
};

/// Result of a non-interactive run
#[derive(Debug, Serialize, Deserialize)]
pub struct NonInteractiveResult {
    /// One entry per prompt, in submission order
    pub turns: Vec<TurnResult>,
    /// Any errors that occurred
    pub errors: Vec<String>,
    /// Metadata about the execution
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResult {
    /// The prompt that was submitted
    pub prompt: String,
    /// The model's reply, absent when the turn failed
    pub response: Option<String>,
    /// Earlier messages replayed before this prompt
    pub replayed: usize,
    /// Error message when the turn failed
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Model used
    pub model: String,
    /// Persona active at the end of the run, if the instruction is a preset
    pub persona: Option<String>,
    /// System instruction the run used
    pub instruction: String,
    pub orphan_policy: OrphanPolicy,
    pub replay_mode: ReplayMode,
    /// Total replayed messages across all turns
    pub replayed_total: usize,
    /// Total tokens used
    pub tokens_used: Option<usize>,
    /// Execution time in milliseconds
    pub duration_ms: u128,
}

/// Runs a script of prompts through one conversation without a terminal UI
pub struct NonInteractiveRunner {
    controller: TurnController,
}

impl NonInteractiveRunner {
    pub fn new(controller: TurnController) -> Self {
        Self { controller }
    }

    /// Submit each prompt in order; a failed turn is recorded and the script
    /// continues, so later turns see the orphan per the configured policy
    pub async fn execute(&mut self, prompts: &[String]) -> NonInteractiveResult {
        let start_time = std::time::Instant::now();
        let mut turns = Vec::with_capacity(prompts.len());
        let mut errors = Vec::new();
        let mut usage: Option<TokenUsage> = None;

        for prompt in prompts {
            match self.controller.submit(prompt).await {
                Ok(outcome) => {
                    if let Some(turn_usage) = outcome.usage {
                        usage = Some(usage.unwrap_or_default().add(turn_usage));
                    }
                    turns.push(TurnResult {
                        prompt: prompt.clone(),
                        response: Some(outcome.reply),
                        replayed: outcome.replayed,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Turn failed");
                    let message = e.to_string();
                    errors.push(format!("{}: {}", prompt, message));
                    turns.push(TurnResult {
                        prompt: prompt.clone(),
                        response: None,
                        replayed: 0,
                        error: Some(message),
                    });
                }
            }
        }

        NonInteractiveResult {
            metadata: ExecutionMetadata {
                model: self.controller.model_name().to_string(),
                persona: self.controller.persona_id().map(str::to_string),
                instruction: self.controller.instruction().to_string(),
                orphan_policy: self.controller.orphan_policy(),
                replay_mode: self.controller.replayer().mode(),
                replayed_total: turns.iter().map(|t| t.replayed).sum(),
                tokens_used: usage.map(|u| u.total_tokens),
                duration_ms: start_time.elapsed().as_millis(),
            },
            turns,
            errors,
        }
    }

    pub fn controller(&self) -> &TurnController {
        &self.controller
    }

    /// Format the result according to the output format
    pub fn format_result(&self, result: &NonInteractiveResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_else(|e| {
                format!("{{\"error\": \"Failed to serialize result: {}\"}}", e)
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                let multi = result.turns.len() > 1;

                for turn in &result.turns {
                    if multi {
                        output.push_str(&format!("> {}\n", turn.prompt));
                    }
                    if let Some(ref response) = turn.response {
                        output.push_str(response);
                        output.push('\n');
                    }
                    if multi {
                        output.push('\n');
                    }
                }

                if !result.errors.is_empty() {
                    output.push_str("\n--- Errors ---\n");
                    for error in &result.errors {
                        output.push_str(&format!("• {}\n", error));
                    }
                }

                output
            }
            OutputFormat::Markdown => {
                let mut output = String::new();

                for (i, turn) in result.turns.iter().enumerate() {
                    output.push_str(&format!("## Turn {}\n\n", i + 1));
                    output.push_str(&format!("**You:** {}\n\n", turn.prompt));
                    match (&turn.response, &turn.error) {
                        (Some(response), _) => {
                            output.push_str(response);
                            output.push_str("\n\n");
                        }
                        (None, Some(error)) => {
                            output.push_str(&format!("*Failed: {}*\n\n", error));
                        }
                        (None, None) => {}
                    }
                }

                if !result.errors.is_empty() {
                    output.push_str("## Errors\n\n");
                    for error in &result.errors {
                        output.push_str(&format!("- {}\n", error));
                    }
                    output.push('\n');
                }

                output.push_str("---\n");
                output.push_str(&format!(
                    "*Model: {} | Persona: {} | Replayed: {} | Tokens: {} | Duration: {}ms*\n",
                    result.metadata.model,
                    result.metadata.persona.as_deref().unwrap_or("custom"),
                    result.metadata.replayed_total,
                    result.metadata.tokens_used.unwrap_or(0),
                    result.metadata.duration_ms
                ));

                output
            }
        }
    }
}
