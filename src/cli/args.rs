use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::conversation::{OrphanPolicy, ReplayMode};

#[derive(Parser, Debug)]
#[command(name = "persona-chat")]
#[command(version)]
#[command(about = "Chat with a hosted language model under a switchable persona", long_about = None)]
pub struct Cli {
    /// Model to use (e.g., gemini-2.5-flash, gemini-2.5-pro)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Persona to start with (see `persona-chat personas`)
    #[arg(long, conflicts_with = "system")]
    pub persona: Option<String>,

    /// Start with a custom system instruction instead of a persona
    #[arg(long)]
    pub system: Option<String>,

    /// What to do with a message whose reply failed: keep, drop or skip
    #[arg(long)]
    pub orphan_policy: Option<OrphanPolicy>,

    /// Session strategy: fresh or persistent
    #[arg(long)]
    pub replay_mode: Option<ReplayMode>,

    /// Non-interactive prompt; repeat to run several turns in one conversation
    #[arg(short, long)]
    pub prompt: Vec<String>,

    /// Output format for non-interactive mode
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Initialize configuration
    Init,
    /// List available personas
    Personas,
    /// Start a chat session (default)
    Chat,
    /// Show version information
    Version,
    /// Check configuration and connectivity
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
    /// Markdown formatted output
    Markdown,
}
