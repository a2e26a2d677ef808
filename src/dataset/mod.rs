// src/dataset/mod.rs — Golden dataset loading, validation, and splits
//
// The golden dataset is a frozen, manually labeled set of Kubernetes log
// samples used as ground truth. It is never edited in place: any change is
// a new file and therefore a new version hash.

use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::infra::errors::LogEvalError;

/// Severity vocabulary for ground-truth labels.
pub const SEVERITIES: [&str; 4] = ["info", "warn", "error", "critical"];

/// Action vocabulary for ground-truth labels.
pub const ACTIONS: [&str; 4] = ["investigate", "monitor", "scale", "fix_config"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub node: String,
    pub message: String,
}

/// The labels a correct analysis should extract for a sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruth {
    pub root_cause: String,
    pub severity: String,
    pub component: String,
    pub summary: String,
    pub action_needed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub category: String,
    pub namespace: String,
    pub lines: Vec<LogLine>,
    pub ground_truth: GroundTruth,
    /// Data provenance: "synthetic" or "real".
    pub source: String,
}

impl Sample {
    /// Template variables derived from this sample for prompt rendering.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("logs".into(), self.format_logs());
        vars.insert("namespace".into(), self.namespace.clone());
        vars.insert("category".into(), self.category.clone());
        vars
    }

    /// One block per log line: header with labels, then the raw message.
    fn format_logs(&self) -> String {
        self.lines
            .iter()
            .map(|l| {
                format!(
                    "[{}] {}/{} (pod={}, node={})\n{}",
                    l.timestamp, l.namespace, l.container, l.pod, l.node, l.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Frozen, versioned labeled sample set.
#[derive(Debug, Clone)]
pub struct GoldenDataset {
    version: String,
    samples: Vec<Sample>,
}

impl GoldenDataset {
    /// Load and validate a dataset file (a JSON array of samples).
    ///
    /// The version is the sha256 of the raw file bytes, so any edit yields
    /// a different version.
    pub fn load(path: &Path) -> Result<Self, LogEvalError> {
        let bytes = std::fs::read(path).map_err(|e| LogEvalError::Dataset {
            context: path.display().to_string(),
            message: e.to_string(),
        })?;
        let samples: Vec<Sample> =
            serde_json::from_slice(&bytes).map_err(|e| LogEvalError::Dataset {
                context: path.display().to_string(),
                message: format!("invalid dataset JSON: {e}"),
            })?;

        let version = hex::encode(Sha256::digest(&bytes));
        Self::from_samples(version, samples)
    }

    /// Validate an in-memory sample set (used by tests and loaders).
    pub fn from_samples(version: String, samples: Vec<Sample>) -> Result<Self, LogEvalError> {
        for sample in &samples {
            validate_sample(sample)?;
        }
        tracing::info!(
            version = %&version[..version.len().min(8)],
            samples = samples.len(),
            "Golden dataset loaded"
        );
        Ok(Self { version, samples })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Deterministic disjoint (train, validation) partitions.
    ///
    /// The same ratio and seed always produce the same split.
    pub fn split(&self, ratio: f64, seed: u64) -> Result<(Vec<Sample>, Vec<Sample>), LogEvalError> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(LogEvalError::Dataset {
                context: "split".into(),
                message: format!("train ratio must be in (0, 1), got {ratio}"),
            });
        }
        if self.samples.is_empty() {
            return Err(LogEvalError::Dataset {
                context: "split".into(),
                message: "cannot split an empty dataset".into(),
            });
        }

        let mut indices: Vec<usize> = (0..self.samples.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let train_len = ((self.samples.len() as f64) * ratio).floor() as usize;
        let (train_idx, val_idx) = indices.split_at(train_len);

        let pick = |idx: &[usize]| idx.iter().map(|&i| self.samples[i].clone()).collect();
        Ok((pick(train_idx), pick(val_idx)))
    }
}

fn validate_sample(sample: &Sample) -> Result<(), LogEvalError> {
    let gt = &sample.ground_truth;
    let fields = [
        ("root_cause", &gt.root_cause),
        ("severity", &gt.severity),
        ("component", &gt.component),
        ("summary", &gt.summary),
        ("action_needed", &gt.action_needed),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(LogEvalError::Dataset {
                context: sample.id.clone(),
                message: format!("ground-truth field '{name}' is empty"),
            });
        }
    }
    if !SEVERITIES.contains(&gt.severity.as_str()) {
        return Err(LogEvalError::Dataset {
            context: sample.id.clone(),
            message: format!(
                "severity '{}' not in vocabulary {:?}",
                gt.severity, SEVERITIES
            ),
        });
    }
    if !ACTIONS.contains(&gt.action_needed.as_str()) {
        return Err(LogEvalError::Dataset {
            context: sample.id.clone(),
            message: format!(
                "action_needed '{}' not in vocabulary {:?}",
                gt.action_needed, ACTIONS
            ),
        });
    }
    Ok(())
}
