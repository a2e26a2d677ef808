// src/provider/mod.rs — Inference backend layer

pub mod openai_compat;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::InferenceError;
use crate::prompt::ModelParams;

/// A single chat-completion backend.
///
/// Implementations are expected to be cheap to share behind an `Arc`;
/// concurrency bounding lives with the caller, since the backend is
/// typically a single capacity-constrained model server.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        system_text: &str,
        user_text: &str,
        params: &ModelParams,
    ) -> Result<Completion, InferenceError>;
}

/// One completed inference call with its cost/latency accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let u = TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 30,
        };
        assert_eq!(u.total(), 150);
    }

    #[test]
    fn test_token_usage_default() {
        let u = TokenUsage::default();
        assert_eq!(u.total(), 0);
    }
}
