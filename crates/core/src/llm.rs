use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::{
    collaborators::LanguageModel,
    config::Config,
    error::{Collaborator, FailureKind, KeyMomentsError, Result},
    provider::{ApiStyle, Provider},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

fn llm_error(kind: FailureKind, message: impl Into<String>) -> KeyMomentsError {
    KeyMomentsError::external(Collaborator::LanguageModel, kind, message)
}

/// HTTP client for whichever hosted model the run selected.
pub struct ChatClient {
    client: reqwest::Client,
    provider: Provider,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatClient {
    pub fn new(provider: Provider, api_key: impl Into<String>, config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
            api_url: provider.config().api_url.to_string(),
            api_key: api_key.into(),
            model: config.model_for(&provider),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, system: &str, prompt: &str) -> reqwest::RequestBuilder {
        let body = request_body(
            self.provider.config().style,
            &self.model,
            system,
            prompt,
            self.max_tokens,
            self.temperature,
        );
        let builder = self
            .client
            .post(&self.api_url)
            .header("content-type", "application/json");

        match self.provider.config().style {
            ApiStyle::AnthropicMessages => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ApiStyle::ChatCompletions => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
        }
        .json(&body)
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        tracing::debug!(provider = self.provider.name(), model = %self.model, "sending analysis request");

        let response = self
            .request(system, prompt)
            .send()
            .await
            .map_err(|e| llm_error(FailureKind::Network, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(llm_error(
                classify_status(status),
                format!("{} returned {}: {}", self.provider.name(), status, body.trim()),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| llm_error(FailureKind::InvalidResponse, e.to_string()))?;

        extract_text(self.provider.config().style, &payload).ok_or_else(|| {
            llm_error(
                FailureKind::InvalidResponse,
                format!("no text content in response: {payload}"),
            )
        })
    }
}

fn request_body(
    style: ApiStyle,
    model: &str,
    system: &str,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) -> Value {
    match style {
        ApiStyle::AnthropicMessages => json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "system": system,
            "messages": [
                { "role": "user", "content": prompt },
            ],
        }),
        ApiStyle::ChatCompletions => json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        }),
    }
}

fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FailureKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Authentication,
        s if s.is_server_error() => FailureKind::Network,
        _ => FailureKind::InvalidResponse,
    }
}

fn extract_text(style: ApiStyle, payload: &Value) -> Option<String> {
    match style {
        ApiStyle::AnthropicMessages => {
            let text: String = payload["content"]
                .as_array()?
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect();
            (!text.is_empty()).then_some(text)
        }
        ApiStyle::ChatCompletions => payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string),
    }
}
