// src/runner/leaderboard.rs — Derived summary over all persisted runs
//
// The leaderboard is rebuilt from run.json records on demand; it holds no
// state of its own, so it can be regenerated at any time and never disagrees
// with the runs on disk. Unreadable run records are skipped with a warning
// rather than failing the whole rebuild.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::errors::LogEvalError;
use crate::infra::store::ArtifactStore;
use crate::runner::ExperimentRun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub experiment_id: String,
    pub config_id: String,
    pub overall_score: f64,
    pub mean_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub results_recorded: usize,
    pub timestamp: DateTime<Utc>,
}

/// Rebuild leaderboard entries from every readable run record, sorted by
/// score descending, then most recent first, then run id.
pub fn build(store: &ArtifactStore) -> Result<Vec<LeaderboardEntry>, LogEvalError> {
    let mut entries = Vec::new();
    for run_id in store.list_run_ids()? {
        let run: ExperimentRun = match store.read_json(&format!("runs/{run_id}/run.json")) {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Skipping unreadable run record");
                continue;
            }
        };
        entries.push(LeaderboardEntry {
            experiment_id: run.run_id,
            config_id: run.config.id,
            overall_score: run.aggregated.map(|a| a.overall).unwrap_or(0.0),
            mean_latency_ms: run.latency.mean_ms,
            p95_latency_ms: run.latency.p95_ms,
            results_recorded: run.results_recorded,
            timestamp: run.finished_at,
        });
    }

    entries.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.experiment_id.cmp(&b.experiment_id))
    });
    Ok(entries)
}

/// Persist the leaderboard. Serialization is deterministic, so rebuilding
/// from unchanged runs writes byte-identical output.
pub fn write(store: &ArtifactStore, entries: &[LeaderboardEntry]) -> Result<(), LogEvalError> {
    store.write_json("leaderboard.json", &entries)
}
