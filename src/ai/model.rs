//! Chat-completions model client (DeepSeek and other OpenAI-compatible providers)

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::LlmConfig;

/// A single structured-output model invocation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Name of the flow issuing the request, for logging
    pub flow: &'static str,
    pub prompt: String,
    /// JSON schema the response object must follow
    pub output_schema: Value,
}

/// Model invocation interface consumed by the flows: given a prompt and an
/// output schema, return a JSON object or fail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<Value>;
}

/// Configuration for an LLM API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://api.deepseek.com")
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// Extra headers to include in requests
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("Model API key not set. Set DEEPSEEK_API_KEY or [llm].api_key in config.toml")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            extra_headers: Vec::new(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completions client
#[derive(Clone)]
pub struct ChatModelClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

impl ChatModelClient {
    pub fn with_provider(provider: ProviderConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            provider,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::with_provider(ProviderConfig::from_config(config)?))
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Send a chat completion request and return the assistant text
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: &self.provider.model,
            messages,
            max_tokens: Some(self.provider.max_tokens),
            response_format: ResponseFormat { r#type: "json_object" },
            stream: false,
        };

        let mut req_builder = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to model provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Model API error ({}): {}", status, body);
        }

        let body = response.text().await.context("Failed to read response body")?;
        let raw: Value = serde_json::from_str(&body).context("Failed to parse JSON response")?;

        message_text(&raw).ok_or_else(|| anyhow!("Model response contained no message content"))
    }
}

#[async_trait]
impl ModelClient for ChatModelClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Value> {
        let schema = serde_json::to_string_pretty(&request.output_schema)
            .context("Failed to serialize output schema")?;
        let messages = vec![
            ChatMessage::system(format!(
                "Respond with a single JSON object and nothing else. \
                 The object must conform to this JSON schema:\n{}",
                schema
            )),
            ChatMessage::user(request.prompt.clone()),
        ];

        debug!(flow = request.flow, model = %self.provider.model, "Invoking model");
        let text = self.complete(messages).await?;
        parse_json_object(&text)
    }
}

/// Extract the first choice's message text. Providers return content either
/// as a plain string or as an array of `{type: "text", text}` parts; some
/// put it under `text` instead of `content`.
pub fn message_text(raw: &Value) -> Option<String> {
    let message = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))?;

    let text = match message.get("content").or_else(|| message.get("text")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                    part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse model text as a JSON object, tolerating a surrounding code fence
pub fn parse_json_object(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: Value = serde_json::from_str(unfenced).context("Model output is not valid JSON")?;
    if !value.is_object() {
        bail!("Model output is not a JSON object");
    }
    Ok(value)
}
