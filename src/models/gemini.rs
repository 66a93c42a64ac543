use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{ChatSession, CompletionService};
use super::types::{ModelConfig, SessionReply, TokenUsage};
use crate::constants::GEMINI_API_KEY_HEADER;
use crate::utils::RemoteServiceError;

/// Finish reasons that mean the provider refused to answer
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Google Gemini completion service (`generateContent` endpoint)
pub struct GeminiService {
    client: Arc<GeminiClient>,
    model_name: String,
}

/// Connection details shared by every session opened from one service
struct GeminiClient {
    http: Client,
    base_url: String,
    model_name: String,
    api_key: String,
    generation_config: GeminiGenerationConfig,
}

impl GeminiService {
    pub fn new(
        api_key: String,
        model_name: &str,
        base_url: &str,
        timeout: Duration,
        config: &ModelConfig,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(GeminiClient {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                model_name: model_name.to_string(),
                api_key,
                generation_config: GeminiGenerationConfig::from(config),
            }),
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for GeminiService {
    fn open_session(
        &self,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatSession>, RemoteServiceError> {
        Ok(Box::new(GeminiSession {
            client: Arc::clone(&self.client),
            system_instruction: system_instruction.to_string(),
            contents: Vec::new(),
        }))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn validate_connection(&self) -> Result<bool, RemoteServiceError> {
        let url = format!(
            "{}/v1beta/models/{}",
            self.client.base_url, self.client.model_name
        );
        let response = self
            .client
            .http
            .get(&url)
            .header(GEMINI_API_KEY_HEADER, &self.client.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status().as_u16() {
            200..=299 => Ok(true),
            401 | 403 => Err(RemoteServiceError::auth("API key was rejected")),
            _ => Ok(false),
        }
    }
}

impl GeminiClient {
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model_name
        )
    }

    async fn generate(
        &self,
        system_instruction: &str,
        contents: &[GeminiContent],
    ) -> Result<SessionReply, RemoteServiceError> {
        let request = build_request(system_instruction, contents, &self.generation_config);

        debug!(
            model = %self.model_name,
            contents = contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header(GEMINI_API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteServiceError::network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Gemini request failed");
            return Err(RemoteServiceError::from_status(status.as_u16(), message));
        }

        parse_response(&body)
    }
}

/// One conversation with Gemini. The API is stateless, so the session keeps
/// the acknowledged exchanges and resends them with every request.
struct GeminiSession {
    client: Arc<GeminiClient>,
    system_instruction: String,
    contents: Vec<GeminiContent>,
}

#[async_trait]
impl ChatSession for GeminiSession {
    fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    async fn send(&mut self, text: &str) -> Result<SessionReply, RemoteServiceError> {
        self.contents.push(GeminiContent::text("user", text));

        match self
            .client
            .generate(&self.system_instruction, &self.contents)
            .await
        {
            Ok(reply) => {
                self.contents.push(GeminiContent::text("model", &reply.text));
                Ok(reply)
            }
            Err(e) => {
                // Only acknowledged exchanges stay in the session
                self.contents.pop();
                Err(e)
            }
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> RemoteServiceError {
    if e.is_timeout() {
        RemoteServiceError::network(format!("Request timeout: {}", e))
    } else if e.is_connect() {
        RemoteServiceError::network(format!("Connection failed: {}", e))
    } else {
        RemoteServiceError::unknown(format!("Request failed: {}", e))
    }
}

fn build_request<'a>(
    system_instruction: &str,
    contents: &'a [GeminiContent],
    generation_config: &GeminiGenerationConfig,
) -> GeminiRequest<'a> {
    GeminiRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: system_instruction.to_string(),
            }],
        },
        contents,
        generation_config: generation_config.clone(),
    }
}

fn parse_response(body: &str) -> Result<SessionReply, RemoteServiceError> {
    let response: GeminiResponse = serde_json::from_str(body).map_err(|e| {
        RemoteServiceError::unknown(format!("Failed to parse response: {}", e))
    })?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(RemoteServiceError::content_policy(format!(
            "Prompt blocked ({})",
            reason
        )));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RemoteServiceError::unknown("No candidates in response"))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(RemoteServiceError::content_policy(format!(
                "Reply blocked ({})",
                reason
            )));
        }
    }

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    // An empty model turn would be rejected on the next send of this session
    if text.is_empty() {
        return Err(RemoteServiceError::unknown(format!(
            "Empty reply (finish reason {})",
            candidate.finish_reason.as_deref().unwrap_or("none")
        )));
    }

    Ok(SessionReply {
        text,
        usage: response.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
    })
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent,
    contents: &'a [GeminiContent],
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

impl From<&ModelConfig> for GeminiGenerationConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            top_p: config.top_p,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
    #[serde(default)]
    total_token_count: usize,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RemoteErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let contents = vec![
            GeminiContent::text("user", "Hi"),
            GeminiContent::text("model", "Hello!"),
            GeminiContent::text("user", "How are you?"),
        ];
        let config = GeminiGenerationConfig::from(&ModelConfig::default());
        let request = build_request("You are a friendly pirate", &contents, &config);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["systemInstruction"],
            json!({"parts": [{"text": "You are a friendly pirate"}]})
        );
        assert_eq!(value["contents"][1]["role"], json!("model"));
        assert_eq!(value["contents"][2]["parts"][0]["text"], json!("How are you?"));
        assert_eq!(value["generationConfig"]["maxOutputTokens"], json!(4096));
        assert!(value["generationConfig"].get("topP").is_none());
    }

    #[test]
    fn test_parse_text_reply() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 7}
        })
        .to_string();

        let reply = parse_response(&body).unwrap();
        assert_eq!(reply.text, "Hello there");
        assert_eq!(
            reply.usage,
            Some(TokenUsage {
                prompt_tokens: 5,
                completion_tokens: 2,
                total_tokens: 7
            })
        );
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let err = parse_response(&body).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ContentPolicy);
    }

    #[test]
    fn test_parse_blocked_candidate() {
        let body = json!({"candidates": [{"finishReason": "PROHIBITED_CONTENT"}]}).to_string();
        let err = parse_response(&body).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ContentPolicy);
    }

    #[test]
    fn test_parse_empty_candidates() {
        let err = parse_response("{\"candidates\": []}").unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unknown);
    }

    #[test]
    fn test_parse_candidate_without_content() {
        let body = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]}).to_string();
        let err = parse_response(&body).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unknown);
        assert!(err.message.contains("MAX_TOKENS"));

        let body = json!({
            "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "OTHER"}]
        })
        .to_string();
        assert_eq!(parse_response(&body).unwrap_err().kind, RemoteErrorKind::Unknown);
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_response("<html>").unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_session_untouched() {
        // Nothing listens on port 9; the connect fails fast.
        let service = GeminiService::new(
            "test-key".to_string(),
            "gemini-2.5-flash",
            "http://127.0.0.1:9",
            Duration::from_secs(2),
            &ModelConfig::default(),
        )
        .unwrap();

        let client = Arc::clone(&service.client);
        let mut session = GeminiSession {
            client,
            system_instruction: "You are a helpful assistant.".to_string(),
            contents: vec![
                GeminiContent::text("user", "Hi"),
                GeminiContent::text("model", "Hello!"),
            ],
        };

        let err = session.send("again").await.unwrap_err();
        assert!(matches!(
            err.kind,
            RemoteErrorKind::Network | RemoteErrorKind::Unknown
        ));
        assert_eq!(session.contents.len(), 2);
    }

    #[test]
    fn test_open_session_uses_instruction() {
        let service = GeminiService::new(
            "k".to_string(),
            "gemini-2.5-flash",
            "https://example.invalid/",
            Duration::from_secs(1),
            &ModelConfig::default(),
        )
        .unwrap();

        let session = service.open_session("Respond only in haikus").unwrap();
        assert_eq!(session.system_instruction(), "Respond only in haikus");
        assert_eq!(service.model_name(), "gemini-2.5-flash");
        assert_eq!(
            service.client.endpoint(),
            "https://example.invalid/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
