// src/provider/retry.rs — Retry with exponential backoff for inference calls
//
// Wraps any CompletionBackend with bounded retry on transient failures.
// Retries: timeouts, rate limits (429), server errors (5xx).
// Does NOT retry: client errors (4xx), malformed response bodies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionBackend};
use crate::infra::config::BackendConfig;
use crate::infra::errors::InferenceError;
use crate::prompt::ModelParams;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY_MS: u64 = 500;
const BACKOFF_FACTOR: f64 = 2.0;
const MAX_DELAY_MS: u64 = 10_000;
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

impl RetryConfig {
    /// Retry budget from `[backend] max_retries`; delay shape keeps its
    /// built-in defaults.
    pub fn from_backend(config: &BackendConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// A backend wrapper that retries transient failures with backoff.
pub struct RetryBackend {
    inner: Arc<dyn CompletionBackend>,
    config: RetryConfig,
}

impl RetryBackend {
    pub fn new(inner: Arc<dyn CompletionBackend>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn CompletionBackend>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Wrap a backend with the retry budget the config asks for.
    pub fn from_config(inner: Arc<dyn CompletionBackend>, config: &BackendConfig) -> Self {
        Self::with_config(inner, RetryConfig::from_backend(config))
    }

    /// Delay before the given retry attempt (0-indexed).
    fn delay_for_attempt(&self, attempt: u32, rate_limit_delay: Option<Duration>) -> Duration {
        // If the server told us how long to wait, honor that (plus a buffer).
        if let Some(rl_delay) = rate_limit_delay {
            return rl_delay + Duration::from_millis(100);
        }

        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let jitter = deterministic_jitter(attempt, self.config.jitter_fraction);
        let final_ms = (capped_ms * jitter).max(50.0);

        Duration::from_millis(final_ms as u64)
    }
}

fn rate_limit_delay(error: &InferenceError) -> Option<Duration> {
    match error {
        InferenceError::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Deterministic jitter per attempt so retry timing is reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64; // 0.0..1.0
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl CompletionBackend for RetryBackend {
    async fn complete(
        &self,
        system_text: &str,
        user_text: &str,
        params: &ModelParams,
    ) -> Result<Completion, InferenceError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.inner.complete(system_text, user_text, params).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    if !e.is_retriable() || attempt == self.config.max_retries {
                        return Err(e);
                    }

                    let rl_delay = rate_limit_delay(&e);
                    let delay = self.delay_for_attempt(attempt, rl_delay);

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(InferenceError::Upstream {
            status: 0,
            message: "all retries exhausted".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> InferenceError,
    }

    #[async_trait]
    impl CompletionBackend for FlakyBackend {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _params: &ModelParams,
        ) -> Result<Completion, InferenceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err((self.error)())
            } else {
                Ok(Completion {
                    content: "severity: error".into(),
                    usage: Default::default(),
                    latency_ms: 5,
                })
            }
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(5),
            jitter_fraction: 0.0,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let inner = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: || InferenceError::Timeout { elapsed_ms: 10 },
        });
        let backend = RetryBackend::with_config(inner.clone(), fast_config());
        let result = backend
            .complete("sys", "user", &ModelParams::default())
            .await;
        assert!(result.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let inner = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || InferenceError::Upstream {
                status: 400,
                message: "bad request".into(),
            },
        });
        let backend = RetryBackend::with_config(inner.clone(), fast_config());
        let result = backend
            .complete("sys", "user", &ModelParams::default())
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_bounded() {
        let inner = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || InferenceError::Upstream {
                status: 503,
                message: "overloaded".into(),
            },
        });
        let backend = RetryBackend::with_config(inner.clone(), fast_config());
        let result = backend
            .complete("sys", "user", &ModelParams::default())
            .await;
        assert!(result.is_err());
        // Initial attempt plus max_retries.
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_delay_exponential() {
        let backend = RetryBackend::with_config(
            Arc::new(FlakyBackend {
                calls: AtomicU32::new(0),
                fail_first: 0,
                error: || InferenceError::Timeout { elapsed_ms: 0 },
            }),
            RetryConfig {
                jitter_fraction: 0.0,
                ..RetryConfig::default()
            },
        );
        let d0 = backend.delay_for_attempt(0, None);
        let d1 = backend.delay_for_attempt(1, None);
        let d2 = backend.delay_for_attempt(2, None);
        assert_eq!(d0.as_millis(), 500);
        assert_eq!(d1.as_millis(), 1000);
        assert_eq!(d2.as_millis(), 2000);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let backend = RetryBackend::with_config(
            Arc::new(FlakyBackend {
                calls: AtomicU32::new(0),
                fail_first: 0,
                error: || InferenceError::Timeout { elapsed_ms: 0 },
            }),
            RetryConfig {
                jitter_fraction: 0.0,
                ..RetryConfig::default()
            },
        );
        let d = backend.delay_for_attempt(10, None);
        assert_eq!(d.as_millis(), 10_000);
    }

    #[test]
    fn test_delay_uses_rate_limit_hint() {
        let backend = RetryBackend::with_config(
            Arc::new(FlakyBackend {
                calls: AtomicU32::new(0),
                fail_first: 0,
                error: || InferenceError::Timeout { elapsed_ms: 0 },
            }),
            RetryConfig::default(),
        );
        let d = backend.delay_for_attempt(0, Some(Duration::from_millis(3000)));
        assert_eq!(d.as_millis(), 3100);
    }

    #[test]
    fn test_retry_config_from_backend() {
        let backend = BackendConfig {
            max_retries: 5,
            ..BackendConfig::default()
        };
        let config = RetryConfig::from_backend(&backend);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(INITIAL_DELAY_MS));
    }

    #[tokio::test]
    async fn test_config_zero_retries_means_single_attempt() {
        let inner = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || InferenceError::Upstream {
                status: 503,
                message: "overloaded".into(),
            },
        });
        let backend_config = BackendConfig {
            max_retries: 0,
            ..BackendConfig::default()
        };
        let backend = RetryBackend::from_config(inner.clone(), &backend_config);
        let result = backend
            .complete("sys", "user", &ModelParams::default())
            .await;
        assert!(result.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rate_limit_delay_extraction() {
        let e = InferenceError::RateLimited { retry_after_ms: 2000 };
        assert_eq!(rate_limit_delay(&e), Some(Duration::from_millis(2000)));
        let e = InferenceError::Timeout { elapsed_ms: 10 };
        assert_eq!(rate_limit_delay(&e), None);
    }

    #[test]
    fn test_deterministic_jitter_range_and_reproducibility() {
        for attempt in 0..20 {
            let j = deterministic_jitter(attempt, 0.2);
            assert!((0.8..=1.2).contains(&j), "jitter {j} out of range");
        }
        assert_eq!(deterministic_jitter(5, 0.2), deterministic_jitter(5, 0.2));
    }
}
