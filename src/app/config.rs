use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    APP_NAME, ASSISTANT_REPLAY_MARKER, DEFAULT_GEMINI_API_KEY_ENV, DEFAULT_GEMINI_BASE_URL,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL_NAME, DEFAULT_PERSONA_ID, DEFAULT_TEMPERATURE, ENV_PREFIX,
    HTTP_REQUEST_TIMEOUT_SECS, LOCAL_CONFIG_DIR,
};
use crate::conversation::{OrphanPolicy, Persona, ReplayMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Model selection and generation parameters
    #[serde(default)]
    pub model: ModelSettings,

    /// Gemini endpoint and credential lookup
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Conversation behavior
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Extra personas appended to the built-in catalog
    #[serde(default)]
    pub personas: Vec<Persona>,

    /// UI configuration
    #[serde(default)]
    pub ui: UIConfig,
}

/// Default model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model name
    pub name: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Nucleus sampling
    pub top_p: Option<f32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: None,
        }
    }
}

/// Gemini configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Environment variable containing API key
    pub api_key_env: String,
    /// API key stored in the config file (the environment variable wins)
    pub api_key: Option<String>,
    /// API root, without the `/v1beta` suffix
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: DEFAULT_GEMINI_API_KEY_ENV.to_string(),
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_secs: HTTP_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Conversation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Persona id active at startup
    pub default_persona: String,
    /// What to do with a user turn whose reply failed
    pub orphan_policy: OrphanPolicy,
    /// Session strategy
    pub replay_mode: ReplayMode,
    /// Prefix for replayed assistant turns
    pub replay_marker: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_persona: DEFAULT_PERSONA_ID.to_string(),
            orphan_policy: OrphanPolicy::default(),
            replay_mode: ReplayMode::default(),
            replay_marker: ASSISTANT_REPLAY_MARKER.to_string(),
        }
    }
}

/// UI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UIConfig {
    /// Show persona sidebar by default
    pub show_sidebar: bool,
    /// Render assistant replies as markdown
    pub render_markdown: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            show_sidebar: true,
            render_markdown: true,
        }
    }
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(LOCAL_CONFIG_DIR).join("config.toml");
    load_config_layers(&[global_config, local_config])
}

/// Load configuration from an explicit file, still honoring env overrides
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    load_config_layers(&[path.to_path_buf()])
}

/// Defaults, then each existing file in order, then `PERSONA_CHAT_*` env vars
pub fn load_config_layers(files: &[PathBuf]) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    for file in files.iter().filter(|f| f.exists()) {
        figment = figment.merge(Toml::file(file));
    }

    // PERSONA_CHAT_MODEL__NAME -> model.name
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment.extract().context("Failed to load configuration")
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

fn home_fallback() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join(APP_NAME))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = match project_dirs() {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => home_fallback()?,
    };
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}

/// Get the data directory (log file lives here)
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = match project_dirs() {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => home_fallback()?,
    };
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => get_config_dir()?.join("config.toml"),
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

const LOCAL_EXAMPLE: &str = r#"# persona-chat project configuration
# This file overrides global settings for this directory

[model]
name = "gemini-2.5-flash"
temperature = 0.7
max_tokens = 4096

[conversation]
default_persona = "default"
# keep | drop | skip
orphan_policy = "keep"
# fresh | persistent
replay_mode = "fresh"

[[personas]]
id = "pirate"
label = "Friendly Pirate"
instruction = "You are a friendly pirate."

[[personas]]
id = "haiku"
label = "Haiku Poet"
instruction = "Respond only in haikus."
"#;

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<()> {
    let config_file = get_config_dir()?.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
        println!("Created default configuration at: {}", config_file.display());
    }

    let local_example = PathBuf::from(LOCAL_CONFIG_DIR).join("config.toml.example");
    if !local_example.exists() {
        if let Some(parent) = local_example.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&local_example, LOCAL_EXAMPLE)?;
        println!("Created example configuration at: {}", local_example.display());
    }

    Ok(())
}
