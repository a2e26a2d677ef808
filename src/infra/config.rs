// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible endpoint (includes /v1).
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token, if any.
    pub api_key_env: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Maximum simultaneous in-flight inference calls.
    pub concurrency: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://llama-cpp.llm.svc.cluster.local:8080/v1".into(),
            model: "llama-3.2-3b-instruct".into(),
            api_key_env: None,
            timeout_seconds: 120,
            max_retries: 3,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Abort a run once this fraction of recorded results are failures.
    pub max_failure_rate: f64,
    /// Never abort before this many results have been recorded.
    pub min_results_before_abort: usize,
    /// Flush the results file every N appended results.
    pub flush_every: usize,
    /// Treat responses with unresolved fields as failures instead of
    /// defaulting them to "unknown".
    pub strict_parsing: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.5,
            min_results_before_abort: 5,
            flush_every: 1,
            strict_parsing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub dataset: PathBuf,
    pub runs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("golden_dataset.json"),
            runs_dir: PathBuf::from("results"),
        }
    }
}

impl EvalConfig {
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EvalConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
