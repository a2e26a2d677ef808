// src/runner/mod.rs — Experiment runner: one config across a dataset split
//
// For each sample, up to `concurrency` in parallel: render → infer → parse →
// score. Workers hand results to a single writer over a channel; the writer
// appends them to results.jsonl in completion order, so a crash loses at
// most the in-flight batch. A single failed sample is recorded zero-scored;
// the run only aborts when the failure rate signals a systemic backend
// problem.

pub mod leaderboard;
pub mod optimizer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};

use crate::dataset::Sample;
use crate::evaluator::parser::{self, ParsedFields};
use crate::evaluator::scorer::{self, MetricResult};
use crate::infra::config::{BackendConfig, RunnerConfig};
use crate::infra::errors::LogEvalError;
use crate::infra::store::ArtifactStore;
use crate::prompt::renderer;
use crate::prompt::PromptConfig;
use crate::provider::{CompletionBackend, TokenUsage};

/// One model response for one sample under one config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub sample_id: String,
    pub config_id: String,
    pub raw_response: String,
    pub parsed: ParsedFields,
    pub latency_ms: u64,
    pub token_usage: TokenUsage,
    /// Set when inference or strict parsing failed; the result is then
    /// zero-scored instead of aborting the run.
    pub error: Option<String>,
}

/// One line of results.jsonl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    pub prediction: Prediction,
    pub metrics: MetricResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub p95_ms: f64,
}

/// Append-only record of one experiment. Never mutated after creation;
/// sufficient to reproduce exactly what configuration produced this score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub run_id: String,
    /// Frozen snapshot of the candidate, template hash and model params included.
    pub config: PromptConfig,
    pub dataset_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub sample_count: usize,
    pub results_recorded: usize,
    pub failure_count: usize,
    pub aggregated: Option<MetricResult>,
    pub latency: LatencyStats,
}

/// Cooperative cancellation for a run: stops issuing new inference calls;
/// in-flight calls finish or time out naturally.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub concurrency: usize,
    pub max_failure_rate: f64,
    pub min_results_before_abort: usize,
    pub flush_every: usize,
    pub strict_parsing: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        let backend = BackendConfig::default();
        let runner = RunnerConfig::default();
        Self::from_config(&backend, &runner)
    }
}

impl RunnerOptions {
    pub fn from_config(backend: &BackendConfig, runner: &RunnerConfig) -> Self {
        Self {
            concurrency: backend.concurrency,
            max_failure_rate: runner.max_failure_rate,
            min_results_before_abort: runner.min_results_before_abort,
            flush_every: runner.flush_every,
            strict_parsing: runner.strict_parsing,
        }
    }
}

pub struct ExperimentRunner {
    backend: Arc<dyn CompletionBackend>,
    store: ArtifactStore,
    options: RunnerOptions,
}

impl ExperimentRunner {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: ArtifactStore,
        options: RunnerOptions,
    ) -> Self {
        Self {
            backend,
            store,
            options,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn run(
        &self,
        config: &PromptConfig,
        samples: &[Sample],
        dataset_version: &str,
    ) -> Result<ExperimentRun, LogEvalError> {
        self.run_with_cancel(config, samples, dataset_version, &CancelHandle::default())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        config: &PromptConfig,
        samples: &[Sample],
        dataset_version: &str,
        cancel: &CancelHandle,
    ) -> Result<ExperimentRun, LogEvalError> {
        if samples.is_empty() {
            return Err(LogEvalError::Dataset {
                context: config.short_id().to_string(),
                message: "cannot run against an empty dataset split".into(),
            });
        }

        // Render everything up front: a structurally bad config must fail
        // before any backend capacity is spent on it.
        let mut rendered = Vec::with_capacity(samples.len());
        for sample in samples {
            rendered.push(renderer::render(config, &sample.template_vars())?);
        }

        let started_at = Utc::now();
        let run_id = format!(
            "{}-{}",
            started_at.format("%Y%m%d-%H%M%S%3f"),
            config.short_id()
        );

        tracing::info!(
            run_id = %run_id,
            config_id = %config.short_id(),
            samples = samples.len(),
            concurrency = self.options.concurrency,
            "Starting experiment run"
        );

        let mut writer = self.store.results_writer(&run_id, self.options.flush_every)?;

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<SampleResult>();
        let flag = cancel.clone();

        let mut handles = Vec::with_capacity(samples.len());
        for (sample, prompt) in samples.iter().cloned().zip(rendered) {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let flag = flag.clone();
            let backend = Arc::clone(&self.backend);
            let params = config.model_defaults.clone();
            let config_id = config.id.clone();
            let strict = self.options.strict_parsing;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if flag.is_cancelled() {
                    return;
                }

                // One clock for every outcome: wall time at the runner
                // boundary, retries included, so latency stats stay
                // comparable between succeeded and failed samples.
                let started = Instant::now();
                let outcome = backend
                    .complete(&prompt.system_text, &prompt.user_text, &params)
                    .await;
                let latency_ms = started.elapsed().as_millis() as u64;

                let result = match outcome {
                    Ok(completion) => {
                        let parsed = parser::parse(&completion.content);
                        let unresolved = parsed.unresolved();
                        if strict && !unresolved.is_empty() {
                            SampleResult {
                                prediction: Prediction {
                                    sample_id: sample.id.clone(),
                                    config_id,
                                    raw_response: completion.content,
                                    parsed,
                                    latency_ms,
                                    token_usage: completion.usage,
                                    error: Some(format!(
                                        "strict parsing: unresolved fields {unresolved:?}"
                                    )),
                                },
                                metrics: MetricResult::zero(),
                            }
                        } else {
                            let metrics = scorer::score(&sample.ground_truth, &parsed);
                            SampleResult {
                                prediction: Prediction {
                                    sample_id: sample.id.clone(),
                                    config_id,
                                    raw_response: completion.content,
                                    parsed,
                                    latency_ms,
                                    token_usage: completion.usage,
                                    error: None,
                                },
                                metrics,
                            }
                        }
                    }
                    Err(e) => SampleResult {
                        prediction: Prediction {
                            sample_id: sample.id.clone(),
                            config_id,
                            raw_response: String::new(),
                            parsed: ParsedFields::unknown(),
                            latency_ms,
                            token_usage: TokenUsage::default(),
                            error: Some(e.to_string()),
                        },
                        metrics: MetricResult::zero(),
                    },
                };

                // Receiver dropping means the run is shutting down; nothing to do.
                let _ = tx.send(result);
            }));
        }
        drop(tx);

        // Single-writer discipline: only this loop touches the results file
        // and the counters.
        let mut metrics = Vec::with_capacity(samples.len());
        let mut latencies = Vec::with_capacity(samples.len());
        let mut failure_count = 0usize;

        while let Some(result) = rx.recv().await {
            if result.prediction.error.is_some() {
                failure_count += 1;
                tracing::warn!(
                    sample_id = %result.prediction.sample_id,
                    error = %result.prediction.error.as_deref().unwrap_or(""),
                    "Sample failed, recording zero score"
                );
            }
            latencies.push(result.prediction.latency_ms);
            metrics.push(result.metrics.clone());
            writer.append(&result)?;

            let recorded = metrics.len();
            if !cancel.is_cancelled()
                && recorded >= self.options.min_results_before_abort
                && (failure_count as f64 / recorded as f64) > self.options.max_failure_rate
            {
                tracing::error!(
                    run_id = %run_id,
                    failure_count,
                    recorded,
                    max_failure_rate = self.options.max_failure_rate,
                    "Failure rate exceeded threshold, aborting run"
                );
                cancel.cancel();
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
        writer.finish()?;

        let results_recorded = metrics.len();
        let status = if results_recorded == samples.len() {
            RunStatus::Complete
        } else {
            RunStatus::Incomplete
        };
        let aggregated = scorer::aggregate(&metrics).ok();
        let latency = latency_stats(&latencies);

        let run = ExperimentRun {
            run_id: run_id.clone(),
            config: config.clone(),
            dataset_version: dataset_version.to_string(),
            started_at,
            finished_at: Utc::now(),
            status,
            sample_count: samples.len(),
            results_recorded,
            failure_count,
            aggregated,
            latency,
        };

        self.store
            .write_json(&format!("runs/{run_id}/run.json"), &run)?;

        tracing::info!(
            run_id = %run_id,
            status = ?run.status,
            results_recorded,
            failure_count,
            overall = run.aggregated.as_ref().map(|a| a.overall).unwrap_or(0.0),
            "Experiment run persisted"
        );

        Ok(run)
    }
}

fn latency_stats(latencies: &[u64]) -> LatencyStats {
    if latencies.is_empty() {
        return LatencyStats::default();
    }
    let mean_ms = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
    LatencyStats {
        mean_ms,
        p95_ms: percentile(latencies, 0.95),
    }
}

fn percentile(values: &[u64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1] as f64
}
