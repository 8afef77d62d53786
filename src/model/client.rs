//! Model client for AI inference using an OpenAI-compatible API.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::history::{History, Message, Role};

/// Model call errors, classified so the resilience layer can decide
/// whether to retry.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("API rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("API authentication failed")]
    Auth,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Model request timed out")]
    Timeout,
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Malformed model response: {0}")]
    Malformed(String),
    #[error("Model call rejected: circuit breaker open")]
    CircuitOpen,
}

impl ModelError {
    /// Whether the error is worth retrying. Authentication and malformed
    /// responses are not; the rest may succeed on a later attempt.
    pub fn retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout | Self::CircuitOpen => {
                true
            }
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Auth | Self::Malformed(_) => false,
        }
    }

    fn from_status(status: StatusCode, message: String, retry_after_secs: Option<u64>) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth,
            429 => Self::RateLimited { retry_after_secs },
            status => Self::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Configuration for the AI model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub extra_body: HashMap<String, Value>,
    /// Request timeout enforced by the HTTP client. A timed-out call
    /// surfaces as [`ModelError::Timeout`].
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let mut extra_body = HashMap::new();
        extra_body.insert("skip_special_tokens".to_string(), json!(false));

        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "autoglm-phone-9b".to_string(),
            max_tokens: 3000,
            temperature: 0.0,
            top_p: 0.85,
            frequency_penalty: 0.2,
            extra_body,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ModelConfig {
    /// Build a config from `PHONE_PILOT_*` environment variables, falling
    /// back to the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = env::var("PHONE_PILOT_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(api_key) = env::var("PHONE_PILOT_API_KEY") {
            config.api_key = api_key;
        }
        if let Ok(model_name) = env::var("PHONE_PILOT_MODEL") {
            config.model_name = model_name;
        }
        if let Some(max_tokens) = env_parse("PHONE_PILOT_MAX_TOKENS") {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = env_parse("PHONE_PILOT_TEMPERATURE") {
            config.temperature = temperature;
        }
        config
    }

    /// Create a new ModelConfig with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new ModelConfig with custom API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Create a new ModelConfig with custom model name.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the maximum number of completion tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Response from the AI model.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub thinking: String,
    pub action: String,
    pub raw_content: String,
}

/// Chat completion collaborator contract.
///
/// The default implementation is [`ModelClient`]; tests and alternative
/// backends provide their own.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, history: &History) -> Result<ModelResponse, ModelError>;
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for interacting with OpenAI-compatible vision-language models.
///
/// The client performs exactly one HTTP request per call; retry and
/// circuit breaking are applied by the caller through the resilience
/// layer.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    /// Create a new ModelClient with the given configuration.
    pub fn new(config: ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Create a new ModelClient with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ModelConfig::default())
    }

    async fn request(&self, history: &History) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut body = json!({
            "messages": wire_messages(history),
            "model": self.config.model_name,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "frequency_penalty": self.config.frequency_penalty,
        });
        if let Value::Object(ref mut map) = body {
            for (key, value) in &self.config.extra_body {
                map.insert(key.clone(), value.clone());
            }
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, error_text, retry_after_secs));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let raw_content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| ModelError::Malformed("no choices in response".to_string()))?;

        let (thinking, action) = parse_response(&raw_content);
        Ok(ModelResponse {
            thinking,
            action,
            raw_content,
        })
    }
}

#[async_trait]
impl ChatModel for ModelClient {
    async fn complete(&self, history: &History) -> Result<ModelResponse, ModelError> {
        self.request(history).await
    }
}

/// Serialize the history into OpenAI wire messages. Images become
/// `image_url` data-URL parts on a content array; text-only messages use a
/// plain string content.
fn wire_messages(history: &History) -> Vec<Value> {
    history.messages().iter().map(wire_message).collect()
}

fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    match &message.image_base64 {
        Some(image) => json!({
            "role": role,
            "content": [
                {
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:image/png;base64,{image}")
                    }
                },
                {
                    "type": "text",
                    "text": message.text
                }
            ]
        }),
        None => json!({
            "role": role,
            "content": message.text
        }),
    }
}

/// Split raw model output into thinking and action parts.
fn parse_response(content: &str) -> (String, String) {
    if !content.contains("<answer>") {
        return (String::new(), content.to_string());
    }

    let parts: Vec<&str> = content.splitn(2, "<answer>").collect();
    let thinking = parts[0]
        .replace("<think>", "")
        .replace("</think>", "")
        .trim()
        .to_string();
    let action = parts
        .get(1)
        .map(|s| s.replace("</answer>", "").trim().to_string())
        .unwrap_or_default();

    (thinking, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model_name, "autoglm-phone-9b");
        assert_eq!(config.max_tokens, 3000);
    }

    #[test]
    fn test_model_config_builders() {
        let config = ModelConfig::default()
            .with_base_url("https://api.example.com/v1")
            .with_api_key("secret")
            .with_model_name("vlm-large")
            .with_max_tokens(1024)
            .with_temperature(0.7);

        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.model_name, "vlm-large");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_model_config_from_env() {
        // Defaults apply while the variables are unset.
        let config = ModelConfig::from_env();
        assert_eq!(config.base_url, "http://localhost:8000/v1");

        env::set_var("PHONE_PILOT_BASE_URL", "http://10.0.0.5:8000/v1");
        env::set_var("PHONE_PILOT_MODEL", "glm-phone-test");
        env::set_var("PHONE_PILOT_MAX_TOKENS", "512");
        env::set_var("PHONE_PILOT_TEMPERATURE", "not-a-number");

        let config = ModelConfig::from_env();
        assert_eq!(config.base_url, "http://10.0.0.5:8000/v1");
        assert_eq!(config.model_name, "glm-phone-test");
        assert_eq!(config.max_tokens, 512);
        // Unparseable values fall back to the default.
        assert_eq!(config.temperature, 0.0);

        env::remove_var("PHONE_PILOT_BASE_URL");
        env::remove_var("PHONE_PILOT_MODEL");
        env::remove_var("PHONE_PILOT_MAX_TOKENS");
        env::remove_var("PHONE_PILOT_TEMPERATURE");
    }

    #[test]
    fn test_parse_response() {
        let content = "<think>I need to tap the button</think><answer>do(action=\"Tap\", element=[100, 200])</answer>";
        let (thinking, action) = parse_response(content);
        assert_eq!(thinking, "I need to tap the button");
        assert_eq!(action, "do(action=\"Tap\", element=[100, 200])");
    }

    #[test]
    fn test_parse_response_no_answer() {
        let (thinking, action) = parse_response("some raw content");
        assert_eq!(thinking, "");
        assert_eq!(action, "some raw content");
    }

    #[test]
    fn test_status_classification() {
        let auth = ModelError::from_status(StatusCode::UNAUTHORIZED, String::new(), None);
        assert!(matches!(auth, ModelError::Auth));
        assert!(!auth.retryable());

        let forbidden = ModelError::from_status(StatusCode::FORBIDDEN, String::new(), None);
        assert!(matches!(forbidden, ModelError::Auth));

        let limited =
            ModelError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new(), Some(30));
        assert!(matches!(
            limited,
            ModelError::RateLimited {
                retry_after_secs: Some(30)
            }
        ));
        assert!(limited.retryable());

        let server = ModelError::from_status(
            StatusCode::SERVICE_UNAVAILABLE,
            "overloaded".to_string(),
            None,
        );
        assert!(matches!(server, ModelError::Api { status: 503, .. }));
        assert!(server.retryable());

        let client_side =
            ModelError::from_status(StatusCode::BAD_REQUEST, "bad body".to_string(), None);
        assert!(!client_side.retryable());
    }

    #[test]
    fn test_retryability_of_transport_errors() {
        assert!(ModelError::Timeout.retryable());
        assert!(ModelError::Network("connection refused".to_string()).retryable());
        assert!(ModelError::CircuitOpen.retryable());
        assert!(!ModelError::Malformed("no choices".to_string()).retryable());
    }

    #[test]
    fn test_wire_message_with_image() {
        let message = Message::user("look at this", Some("base64data".to_string()));
        let wire = wire_message(&message);

        assert_eq!(wire["role"], "user");
        assert_eq!(wire["content"][0]["type"], "image_url");
        assert_eq!(
            wire["content"][0]["image_url"]["url"],
            "data:image/png;base64,base64data"
        );
        assert_eq!(wire["content"][1]["text"], "look at this");
    }

    #[test]
    fn test_wire_message_text_only() {
        let message = Message::assistant("done");
        let wire = wire_message(&message);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["content"], "done");
    }

    #[test]
    fn test_wire_messages_preserve_order() {
        let mut history = History::new();
        history.push_system("sys");
        history.push_user("task", Some("img".to_string()));
        history.push_assistant("<think>t</think><answer>do()</answer>");

        let wire = wire_messages(&history);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[2]["role"], "assistant");
    }
}
