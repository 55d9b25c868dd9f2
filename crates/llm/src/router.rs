use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ServiceError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenRouter,
}

impl Provider {
    /// Parse the `llm.provider` config value.  Anything that is not
    /// `openrouter` falls back to Ollama.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("openrouter") {
            Self::OpenRouter
        } else {
            Self::Ollama
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ServiceError> {
        let endpoint = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false
        });

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                ServiceError::Unavailable(format!(
                    "Ollama unavailable at {}: {err}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Malformed(err.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body.to_string()));
        }

        body.get("response")
            .and_then(|value| value.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| ServiceError::Malformed(format!("Ollama response missing text: {body}")))
    }
}

impl OpenRouterClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ServiceError> {
        let api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ServiceError::Unavailable(
                "OPENROUTER_API_KEY is not set".to_string(),
            ));
        }

        let payload = json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        let response = self
            .client
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(api_key)
            .header("X-Title", "Quill")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ServiceError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Malformed(err.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body.to_string()));
        }

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| ServiceError::Malformed(format!("OpenRouter response empty: {body}")))
    }
}

/// Dispatches a single completion to whichever provider is configured.
#[derive(Debug, Clone)]
pub struct LlmRouter {
    provider: Provider,
    model: String,
    ollama: OllamaClient,
    openrouter: OpenRouterClient,
}

impl LlmRouter {
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        ollama_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::Unavailable(err.to_string()))?;
        Ok(Self {
            provider,
            model: model.into(),
            ollama: OllamaClient::new(client.clone(), ollama_base_url),
            openrouter: OpenRouterClient::new(client),
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        match self.provider {
            Provider::Ollama => self.ollama.complete(&self.model, prompt).await,
            Provider::OpenRouter => self.openrouter.complete(&self.model, prompt).await,
        }
    }
}

/// Map a non-success HTTP status onto the error kinds callers care about.
pub(crate) fn status_error(status: u16, body: &str) -> ServiceError {
    match status {
        429 => ServiceError::RateLimited(body.to_string()),
        413 => ServiceError::TooLarge(body.to_string()),
        _ => ServiceError::Unavailable(format!("provider error ({status}): {body}")),
    }
}
