//! HTTP client for OpenAI-compatible chat-completion backends.
//!
//! The pipeline is backend-agnostic: anything speaking the chat-completions
//! dialect (vLLM, LiteLLM, OpenRouter, ...) works. Retries are composed by
//! callers through `RetryPolicy`; this client performs single requests.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

use super::TextBackend;

/// Request timeout for a single completion call.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Sampling temperature for free-text generation.
const TEXT_TEMPERATURE: f64 = 0.7;

/// Sampling temperature for JSON-constrained generation.
const JSON_TEMPERATURE: f64 = 0.2;

/// Completion token budget per call.
const MAX_TOKENS: u32 = 8192;

/// Connection settings for the generative backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the chat-completions API, e.g. `http://localhost:4000/v1`.
    pub api_base: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Model identifier passed through verbatim.
    pub model: String,
}

impl BackendConfig {
    /// Builds a config from `WEBFORGE_API_BASE`, `WEBFORGE_API_KEY` and
    /// `WEBFORGE_MODEL`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("WEBFORGE_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("WEBFORGE_API_KEY").ok();
        let model = env::var("WEBFORGE_MODEL")
            .unwrap_or_else(|_| "qwen/qwen3-coder-480b".to_string());
        Ok(Self {
            api_base,
            api_key,
            model,
        })
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

/// Reqwest-backed implementation of [`TextBackend`].
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Creates a backend client with the given connection settings.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client - system TLS configuration error"),
            config,
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        system: Option<&str>,
        json_mode: bool,
    ) -> ApiRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(Message {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        ApiRequest {
            model: self.config.model.clone(),
            messages,
            temperature: if json_mode {
                JSON_TEMPERATURE
            } else {
                TEXT_TEMPERATURE
            },
            max_tokens: MAX_TOKENS,
            response_format: json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }

    async fn execute(&self, request: &ApiRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&body) {
                if code == 429 {
                    return Err(LlmError::RateLimited(parsed.error.message));
                }
                return Err(LlmError::ApiError {
                    code,
                    message: parsed.error.message,
                });
            }
            return Err(LlmError::ApiError {
                code,
                message: body,
            });
        }

        let payload: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(content)
    }
}

#[async_trait]
impl TextBackend for HttpBackend {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError> {
        let request = self.build_request(prompt, system, false);
        self.execute(&request).await
    }

    async fn complete_json(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError> {
        let request = self.build_request(prompt, system, true);
        match self.execute(&request).await {
            Ok(content) => Ok(content),
            // Some backends reject response_format; fall back to free text
            // and let the caller's JSON extraction cope.
            Err(LlmError::ApiError { code: 400, .. }) => {
                let request = self.build_request(prompt, system, false);
                self.execute(&request).await
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BackendConfig {
        BackendConfig {
            api_base: "http://localhost:4000/v1/".to_string(),
            api_key: Some("sk-test".to_string()),
            model: "test-model".to_string(),
        }
    }

    #[test]
    fn json_mode_sets_response_format_and_low_temperature() {
        let backend = HttpBackend::new(test_config());
        let request = backend.build_request("prompt", Some("system"), true);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.response_format.is_some());
        assert!(request.temperature < TEXT_TEMPERATURE);

        let body = serde_json::to_value(&request).expect("serializes");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn text_mode_omits_response_format() {
        let backend = HttpBackend::new(test_config());
        let request = backend.build_request("prompt", None, false);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        let body = serde_json::to_value(&request).expect("serializes");
        assert!(body.get("response_format").is_none());
    }
}
