// src/runner/optimizer.rs — Sweep a search space and rank the candidates
//
// The optimizer enumerates (or samples) candidates, runs each one over the
// same dataset split, and ranks them by aggregate score with latency and
// config id as tie-breakers so rankings are fully deterministic.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::dataset::Sample;
use crate::evaluator::scorer::MetricResult;
use crate::infra::errors::LogEvalError;
use crate::infra::store::ArtifactStore;
use crate::prompt::search_space::CandidateGenerator;
use crate::prompt::PromptConfig;
use crate::runner::{CancelHandle, ExperimentRunner};

/// A candidate with its run outcome, in final ranking order.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub config: PromptConfig,
    pub run_id: String,
    pub aggregated: MetricResult,
    pub mean_latency_ms: f64,
}

/// One row of ranking.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub config_id: String,
    pub description: String,
    pub run_id: String,
    pub overall: f64,
    pub mean_latency_ms: f64,
}

/// The exported winner, written to best/<config_id>.json. Self-contained:
/// carries the full config so it can be deployed without the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestConfig {
    pub config: PromptConfig,
    pub overall: f64,
    pub run_id: String,
    pub dataset_version: String,
    pub exported_at: chrono::DateTime<chrono::Utc>,
}

pub struct Optimizer {
    runner: ExperimentRunner,
}

impl Optimizer {
    pub fn new(runner: ExperimentRunner) -> Self {
        Self { runner }
    }

    pub fn store(&self) -> &ArtifactStore {
        self.runner.store()
    }

    /// Run every candidate (bounded by `sample_size`) against the samples,
    /// persist per-candidate runs, write ranking.json, and export the winner.
    pub async fn optimize(
        &self,
        generator: &CandidateGenerator,
        samples: &[Sample],
        dataset_version: &str,
        sample_size: usize,
        seed: u64,
    ) -> Result<Vec<RankedCandidate>, LogEvalError> {
        self.optimize_with_cancel(
            generator,
            samples,
            dataset_version,
            sample_size,
            seed,
            &CancelHandle::default(),
        )
        .await
    }

    pub async fn optimize_with_cancel(
        &self,
        generator: &CandidateGenerator,
        samples: &[Sample],
        dataset_version: &str,
        sample_size: usize,
        seed: u64,
        cancel: &CancelHandle,
    ) -> Result<Vec<RankedCandidate>, LogEvalError> {
        let candidates = if generator.total() <= sample_size {
            generator.enumerate()?
        } else {
            generator.sample(sample_size, seed)?
        };

        tracing::info!(
            candidates = candidates.len(),
            space_total = generator.total(),
            samples = samples.len(),
            "Starting optimization sweep"
        );

        let mut ranked = Vec::with_capacity(candidates.len());
        for (i, config) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(completed = i, "Sweep cancelled, ranking completed runs only");
                break;
            }
            // Each run gets its own abort tracking; cancelling the sweep
            // still lets the current run finish its in-flight calls.
            let run_cancel = CancelHandle::default();
            let run = self
                .runner
                .run_with_cancel(config, samples, dataset_version, &run_cancel)
                .await?;
            ranked.push(RankedCandidate {
                config: config.clone(),
                run_id: run.run_id,
                aggregated: run.aggregated.unwrap_or_else(MetricResult::zero),
                mean_latency_ms: run.latency.mean_ms,
            });
        }

        if ranked.is_empty() {
            return Err(LogEvalError::EmptyResultSet);
        }

        ranked.sort_by(compare_candidates);

        let ranking: Vec<RankingEntry> = ranked
            .iter()
            .enumerate()
            .map(|(i, c)| RankingEntry {
                rank: i + 1,
                config_id: c.config.id.clone(),
                description: c.config.description.clone(),
                run_id: c.run_id.clone(),
                overall: c.aggregated.overall,
                mean_latency_ms: c.mean_latency_ms,
            })
            .collect();
        self.store().write_json("ranking.json", &ranking)?;

        let winner = &ranked[0];
        let best = BestConfig {
            config: winner.config.clone(),
            overall: winner.aggregated.overall,
            run_id: winner.run_id.clone(),
            dataset_version: dataset_version.to_string(),
            exported_at: chrono::Utc::now(),
        };
        self.store()
            .write_json(&format!("best/{}.json", winner.config.id), &best)?;

        tracing::info!(
            winner = %winner.config.short_id(),
            overall = winner.aggregated.overall,
            "Optimization sweep complete"
        );

        Ok(ranked)
    }
}

/// Score descending, then mean latency ascending, then config id ascending.
fn compare_candidates(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.aggregated
        .overall
        .partial_cmp(&a.aggregated.overall)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.mean_latency_ms
                .partial_cmp(&b.mean_latency_ms)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.config.id.cmp(&b.config.id))
}
