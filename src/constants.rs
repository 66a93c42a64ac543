/// Constants module to avoid magic numbers in the codebase

// Network Configuration
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;

// UI Configuration
pub const UI_REFRESH_INTERVAL_MS: u64 = 50;
pub const UI_SCROLL_LINES: u16 = 3;
pub const UI_DEFAULT_VIEWPORT_HEIGHT: u16 = 20;

// Default Model Configuration
pub const DEFAULT_MODEL_NAME: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 4096;

// Conversation
pub const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant.";
pub const DEFAULT_PERSONA_ID: &str = "default";
pub const ASSISTANT_REPLAY_MARKER: &str = "(assistant previously said) ";

// Config discovery
pub const APP_NAME: &str = "persona-chat";
pub const ENV_PREFIX: &str = "PERSONA_CHAT_";
pub const LOCAL_CONFIG_DIR: &str = ".persona-chat";
pub const LOG_FILE_NAME: &str = "persona-chat.log";
