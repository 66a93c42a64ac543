use anyhow::Result;
use colored::Colorize;

use crate::{
    app::{get_config_dir, init_config, Config},
    conversation::PersonaCatalog,
    models::ModelFactory,
};

use super::Commands;

/// Handle CLI subcommands; `Ok(false)` means continue to the chat interface
pub async fn handle_command(command: &Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("Initializing persona-chat configuration...");
            init_config()?;
            println!("Configuration initialized successfully!");
            Ok(true)
        }
        Commands::Personas => {
            list_personas(config);
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
        Commands::Status => {
            show_status(config).await?;
            Ok(true)
        }
        Commands::Chat => Ok(false),
    }
}

/// List built-in and configured personas
pub fn list_personas(config: &Config) {
    let catalog = PersonaCatalog::builtin().with_extra(config.personas.iter().cloned());
    println!("Available personas:");
    for (id, label) in catalog.list() {
        let marker = if id == config.conversation.default_persona {
            " (default)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("  • {:<16} {}{}", id.green(), label, marker);
    }
}

/// Show version information
pub fn show_version() {
    println!("persona-chat v{}", env!("CARGO_PKG_VERSION"));
    println!("   Persona-driven chat with a hosted language model");
}

/// Show configuration and connectivity
async fn show_status(config: &Config) -> Result<()> {
    println!("persona-chat Status:");
    println!();

    let config_path = get_config_dir()?.join("config.toml");
    if config_path.exists() {
        println!("  [OK] Configuration: {}", config_path.display());
    } else {
        println!("  [WARNING] Configuration: Not found (using defaults)");
    }

    println!("  Model: {}", config.model.name);
    println!(
        "  Conversation: persona={}, orphan policy={}, replay mode={}",
        config.conversation.default_persona,
        config.conversation.orphan_policy,
        config.conversation.replay_mode
    );

    match ModelFactory::create(config, None) {
        Ok(service) => match service.validate_connection().await {
            Ok(true) => println!("  [OK] Gemini: {} reachable", service.model_name()),
            Ok(false) => println!(
                "  [WARNING] Gemini: {} not available at {}",
                service.model_name(),
                config.gemini.base_url
            ),
            Err(e) => println!("  [ERROR] Gemini: {}", e),
        },
        Err(e) => println!("  [ERROR] {}", e),
    }

    println!("\n  Environment:");
    let key_state = if std::env::var(&config.gemini.api_key_env).is_ok() {
        "Set"
    } else {
        "Not set"
    };
    println!("    • {}: {}", config.gemini.api_key_env, key_state);

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_continues_to_interface() {
        let config = Config::default();
        assert!(!handle_command(&Commands::Chat, &config).await.unwrap());
    }

    #[tokio::test]
    async fn test_personas_and_version_exit() {
        let config = Config::default();
        assert!(handle_command(&Commands::Personas, &config).await.unwrap());
        assert!(handle_command(&Commands::Version, &config).await.unwrap());
    }
}
