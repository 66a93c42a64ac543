use std::time::Duration;
use tracing::debug;

use super::gemini::GeminiService;
use super::traits::CompletionService;
use super::types::ModelConfig;
use crate::app::{Config, GeminiConfig};
use crate::utils::ChatError;

/// Factory for creating completion services from configuration
pub struct ModelFactory;

impl ModelFactory {
    /// Create the completion service described by `config`
    ///
    /// `model_override` (from `--model`) wins over `model.name`. A missing
    /// credential is a configuration error, which is fatal at startup.
    pub fn create(
        config: &Config,
        model_override: Option<&str>,
    ) -> Result<Box<dyn CompletionService>, ChatError> {
        let model_name = model_override.unwrap_or(&config.model.name);
        if model_name.trim().is_empty() {
            return Err(ChatError::Configuration("Model name is empty".to_string()));
        }

        let api_key = Self::resolve_api_key(&config.gemini)?;
        let model_config = ModelConfig {
            temperature: Some(config.model.temperature),
            max_tokens: Some(config.model.max_tokens),
            top_p: config.model.top_p,
        };

        debug!(model = model_name, base_url = %config.gemini.base_url, "Creating Gemini service");

        let service = GeminiService::new(
            api_key,
            model_name,
            &config.gemini.base_url,
            Duration::from_secs(config.gemini.timeout_secs),
            &model_config,
        )
        .map_err(|e| ChatError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Box::new(service))
    }

    /// Find the API key: environment variable named by `api_key_env` first,
    /// then the literal `api_key` from the config file
    pub fn resolve_api_key(gemini: &GeminiConfig) -> Result<String, ChatError> {
        let from_env = std::env::var(&gemini.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        from_env
            .or_else(|| gemini.api_key.clone().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| {
                ChatError::Configuration(format!(
                    "No API key found. Set {} or add `api_key` under [gemini] in config.toml",
                    gemini.api_key_env
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_config(env: &str, key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            api_key_env: env.to_string(),
            api_key: key.map(str::to_string),
            ..GeminiConfig::default()
        }
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let config = gemini_config("PERSONA_CHAT_TEST_KEY_THAT_IS_NEVER_SET", None);
        let err = ModelFactory::resolve_api_key(&config).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("PERSONA_CHAT_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_key_from_config_file() {
        let config = gemini_config("PERSONA_CHAT_TEST_KEY_THAT_IS_NEVER_SET", Some("abc"));
        assert_eq!(ModelFactory::resolve_api_key(&config).unwrap(), "abc");
    }

    #[test]
    fn test_blank_config_key_rejected() {
        let config = gemini_config("PERSONA_CHAT_TEST_KEY_THAT_IS_NEVER_SET", Some("  "));
        assert!(ModelFactory::resolve_api_key(&config).is_err());
    }

    #[test]
    fn test_env_key_wins() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PERSONA_CHAT_TEST_ENV_KEY", "from-env");
            let config = gemini_config("PERSONA_CHAT_TEST_ENV_KEY", Some("from-file"));
            assert_eq!(ModelFactory::resolve_api_key(&config).unwrap(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_create_with_override() {
        let mut config = Config::default();
        config.gemini = gemini_config("PERSONA_CHAT_TEST_KEY_THAT_IS_NEVER_SET", Some("abc"));

        let service = ModelFactory::create(&config, Some("gemini-2.5-pro")).unwrap();
        assert_eq!(service.model_name(), "gemini-2.5-pro");

        let service = ModelFactory::create(&config, None).unwrap();
        assert_eq!(service.model_name(), "gemini-2.5-flash");
    }
}
