use anyhow::Result;
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    app::{get_data_dir, load_config, load_config_from, Config},
    cli::{handle_command, Cli, Commands},
    constants::LOG_FILE_NAME,
    conversation::{ContextReplayer, ConversationState, PersonaCatalog, TurnController},
    models::{CompletionService, ModelFactory},
    tui::{run_ui, App},
    utils::{init_logger, log_error, log_info, ChatError},
};

use super::non_interactive::NonInteractiveRunner;

/// Main runtime orchestrator
pub struct Orchestrator {
    cli: Cli,
    config: Config,
}

impl Orchestrator {
    /// Create a new orchestrator from CLI args
    pub fn new(cli: Cli) -> Result<Self> {
        let config = match &cli.config {
            // An explicit file must load; it replaces the file layers
            Some(path) => load_config_from(path)?,
            None => match load_config() {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("⚠️  Failed to load config: {}. Using defaults.", e);
                    Config::default()
                }
            },
        };

        Ok(Self { cli, config })
    }

    pub fn with_config(cli: Cli, config: Config) -> Self {
        Self { cli, config }
    }

    /// Run the orchestrator
    pub async fn run(self) -> Result<()> {
        let interactive = self.is_interactive();
        if interactive {
            // Log lines would tear the alternate screen, so they go to a file
            let log_file = get_data_dir()?.join(LOG_FILE_NAME);
            init_logger(self.cli.verbose, Some(&log_file))?;
        } else {
            init_logger(self.cli.verbose, None)?;
        }

        if let Some(command) = &self.cli.command {
            if handle_command(command, &self.config).await? {
                return Ok(());
            }
        }

        let service = match ModelFactory::create(&self.config, self.cli.model.as_deref()) {
            Ok(s) => s,
            Err(e) => {
                log_error("❌", &e);
                eprintln!("❌ Failed to initialize model: {}", e);
                eprintln!("   Run `persona-chat status` to check your configuration.");
                std::process::exit(1);
            }
        };

        if interactive {
            self.run_interactive(service).await
        } else {
            self.run_non_interactive(service).await
        }
    }

    /// The TUI runs for `chat` (or no subcommand) without scripted prompts
    fn is_interactive(&self) -> bool {
        matches!(self.cli.command, None | Some(Commands::Chat)) && self.cli.prompt.is_empty()
    }

    async fn run_interactive(&self, service: Box<dyn CompletionService>) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = self.build_controller(service)?.with_notifier(tx);

        println!(
            "Starting persona-chat with model: {}",
            controller.model_name().green()
        );
        log_info(
            "🚀",
            format!(
                "Starting interactive session with {} ({})",
                controller.model_name(),
                controller.persona_id().unwrap_or("custom instruction")
            ),
        );

        let app = App::new(controller, rx, &self.config.ui);
        run_ui(app).await
    }

    async fn run_non_interactive(&self, service: Box<dyn CompletionService>) -> Result<()> {
        let controller = self.build_controller(service)?;
        let mut runner = NonInteractiveRunner::new(controller);

        let result = runner.execute(&self.cli.prompt).await;
        println!("{}", runner.format_result(&result, self.cli.output_format));

        if !result.errors.is_empty() {
            warn!(failed = result.errors.len(), "Some turns failed");
            std::process::exit(1);
        }

        Ok(())
    }

    /// Assemble the conversation from config and flags; flags win
    pub fn build_controller(
        &self,
        service: Box<dyn CompletionService>,
    ) -> Result<TurnController, ChatError> {
        let conversation = &self.config.conversation;
        let catalog = PersonaCatalog::builtin().with_extra(self.config.personas.iter().cloned());

        let state = match &self.cli.system {
            Some(text) => {
                let mut state = ConversationState::with_instruction(text);
                if let Some(persona) = catalog.find_by_instruction(state.instruction()) {
                    let id = persona.id.clone();
                    state.select_persona(&catalog, &id)?;
                }
                state
            }
            None => {
                let id = self
                    .cli
                    .persona
                    .as_deref()
                    .unwrap_or(&conversation.default_persona);
                ConversationState::new(catalog.lookup(id)?)
            }
        };

        let orphan_policy = self.cli.orphan_policy.unwrap_or(conversation.orphan_policy);
        let replay_mode = self.cli.replay_mode.unwrap_or(conversation.replay_mode);

        Ok(TurnController::new(catalog, state, service)
            .with_replayer(ContextReplayer::new(
                replay_mode,
                conversation.replay_marker.as_str(),
            ))
            .with_orphan_policy(orphan_policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{OrphanPolicy, Persona, ReplayMode};
    use crate::models::testing::ScriptedService;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn orchestrator(args: &[&str], config: Config) -> Orchestrator {
        let mut argv = vec!["persona-chat"];
        argv.extend_from_slice(args);
        Orchestrator::with_config(Cli::try_parse_from(argv).unwrap(), config)
    }

    #[test]
    fn test_default_persona_from_config() {
        let mut config = Config::default();
        config.conversation.default_persona = "marathi-tutor".to_string();
        let service = ScriptedService::new();

        let controller = orchestrator(&[], config)
            .build_controller(Box::new(service))
            .unwrap();
        assert_eq!(controller.persona_id(), Some("marathi-tutor"));
        assert_eq!(controller.orphan_policy(), OrphanPolicy::Keep);
        assert_eq!(controller.replayer().mode(), ReplayMode::Fresh);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.conversation.orphan_policy = OrphanPolicy::Drop;
        let service = ScriptedService::new();

        let controller = orchestrator(
            &[
                "--persona",
                "telugu-tutor",
                "--orphan-policy",
                "skip",
                "--replay-mode",
                "persistent",
            ],
            config,
        )
        .build_controller(Box::new(service))
        .unwrap();

        assert_eq!(controller.persona_id(), Some("telugu-tutor"));
        assert_eq!(controller.orphan_policy(), OrphanPolicy::Skip);
        assert_eq!(controller.replayer().mode(), ReplayMode::Persistent);
    }

    #[test]
    fn test_custom_system_instruction() {
        let service = ScriptedService::new();
        let controller = orchestrator(&["--system", "You are a friendly pirate"], Config::default())
            .build_controller(Box::new(service))
            .unwrap();

        assert_eq!(controller.instruction(), "You are a friendly pirate");
        assert_eq!(controller.persona_id(), None);
    }

    #[test]
    fn test_configured_persona_is_selectable() {
        let mut config = Config::default();
        config
            .personas
            .push(Persona::new("haiku", "Haiku Poet", "Respond only in haikus."));
        let service = ScriptedService::new();

        let controller = orchestrator(&["--persona", "haiku"], config)
            .build_controller(Box::new(service))
            .unwrap();
        assert_eq!(controller.instruction(), "Respond only in haikus.");
    }

    #[test]
    fn test_unknown_persona_is_rejected() {
        let service = ScriptedService::new();
        let result = orchestrator(&["--persona", "klingon"], Config::default())
            .build_controller(Box::new(service));
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[test]
    fn test_interactive_only_without_prompts() {
        assert!(orchestrator(&[], Config::default()).is_interactive());
        assert!(orchestrator(&["chat"], Config::default()).is_interactive());
        assert!(!orchestrator(&["-p", "Hi"], Config::default()).is_interactive());
        assert!(!orchestrator(&["personas"], Config::default()).is_interactive());
    }
}
