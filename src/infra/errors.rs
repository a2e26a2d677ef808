// src/infra/errors.rs — Error types for logeval

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogEvalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required input '{variable}' for prompt config {prompt_id}")]
    MissingVariable { prompt_id: String, variable: String },

    #[error("Dataset error ({context}): {message}")]
    Dataset { context: String, message: String },

    #[error("Cannot aggregate an empty result set")]
    EmptyResultSet,

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures at the inference backend boundary.
///
/// Transient failures (timeout, rate limit, 5xx) are retriable; everything
/// else surfaces immediately so a bad request cannot burn backend capacity.
#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    #[error("Inference request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Rate limited by backend, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Backend returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed backend response: {message}")]
    MalformedResponse { message: String },
}

impl InferenceError {
    pub fn is_retriable(&self) -> bool {
        match self {
            InferenceError::Timeout { .. } => true,
            InferenceError::RateLimited { .. } => true,
            InferenceError::Upstream { status, .. } => *status >= 500,
            InferenceError::MalformedResponse { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retriable() {
        assert!(InferenceError::Timeout { elapsed_ms: 1000 }.is_retriable());
    }

    #[test]
    fn test_rate_limited_is_retriable() {
        assert!(InferenceError::RateLimited { retry_after_ms: 500 }.is_retriable());
    }

    #[test]
    fn test_server_error_is_retriable() {
        let e = InferenceError::Upstream {
            status: 503,
            message: "overloaded".into(),
        };
        assert!(e.is_retriable());
    }

    #[test]
    fn test_client_error_is_not_retriable() {
        let e = InferenceError::Upstream {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!e.is_retriable());
    }

    #[test]
    fn test_malformed_is_not_retriable() {
        let e = InferenceError::MalformedResponse {
            message: "no choices".into(),
        };
        assert!(!e.is_retriable());
    }

    #[test]
    fn test_missing_variable_names_the_key() {
        let e = LogEvalError::MissingVariable {
            prompt_id: "abc123".into(),
            variable: "logs".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("logs"));
        assert!(msg.contains("abc123"));
    }

    #[test]
    fn test_dataset_error_names_context() {
        let e = LogEvalError::Dataset {
            context: "sample-42".into(),
            message: "severity 'catastrophic' not in vocabulary".into(),
        };
        assert!(e.to_string().contains("sample-42"));
    }
}
