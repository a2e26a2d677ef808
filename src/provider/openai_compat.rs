// src/provider/openai_compat.rs — OpenAI-compatible chat-completion client
//
// Works against any endpoint speaking the OpenAI chat API (llama.cpp server,
// vLLM, Ollama's compat layer). Request: a messages array; response:
// {choices: [{message: {content}}], usage: {prompt_tokens, completion_tokens}}.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Completion, CompletionBackend, TokenUsage};
use crate::infra::config::BackendConfig;
use crate::infra::errors::InferenceError;
use crate::prompt::ModelParams;

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            timeout,
        }
    }

    /// Build from config, resolving the bearer token from the named env var.
    pub fn from_config(config: &BackendConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    async fn complete(
        &self,
        system_text: &str,
        user_text: &str,
        params: &ModelParams,
    ) -> Result<Completion, InferenceError> {
        let body = serde_json::json!({
            "model": params.model,
            "messages": [
                {"role": "system", "content": system_text},
                {"role": "user", "content": user_text},
            ],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        let started = Instant::now();

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                InferenceError::Upstream {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(InferenceError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InferenceError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let data: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| InferenceError::MalformedResponse {
                    message: format!("response body is not JSON: {e}"),
                })?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InferenceError::MalformedResponse {
                message: "missing choices[0].message.content".into(),
            })?
            .to_string();

        let usage = TokenUsage {
            prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %params.model,
            latency_ms,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Completion finished"
        );

        Ok(Completion {
            content,
            usage,
            latency_ms,
        })
    }
}
