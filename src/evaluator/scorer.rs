// src/evaluator/scorer.rs — Per-field and weighted-overall scoring
//
// Categorical fields (severity, action_needed) score by exact match after
// trimming and case folding. Free-text fields (root_cause, component,
// summary) score by token-set Jaccard similarity, which tolerates word
// order and phrasing differences without crediting unrelated text.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dataset::GroundTruth;
use crate::evaluator::parser::ParsedFields;
use crate::infra::errors::LogEvalError;

/// Field weights for the overall score. Must sum to 1.0.
pub const WEIGHT_ROOT_CAUSE: f64 = 0.40;
pub const WEIGHT_ACTION_NEEDED: f64 = 0.25;
pub const WEIGHT_SEVERITY: f64 = 0.20;
pub const WEIGHT_SUMMARY: f64 = 0.10;
pub const WEIGHT_COMPONENT: f64 = 0.05;

/// Per-field scores in [0, 1] plus the weighted overall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub root_cause: f64,
    pub severity: f64,
    pub component: f64,
    pub summary: f64,
    pub action_needed: f64,
    pub overall: f64,
}

impl MetricResult {
    pub fn zero() -> Self {
        Self {
            root_cause: 0.0,
            severity: 0.0,
            component: 0.0,
            summary: 0.0,
            action_needed: 0.0,
            overall: 0.0,
        }
    }
}

/// Case- and whitespace-insensitive equality for categorical fields.
pub fn exact_match(expected: &str, predicted: &str) -> f64 {
    if expected.trim().eq_ignore_ascii_case(predicted.trim()) {
        1.0
    } else {
        0.0
    }
}

/// Token-set Jaccard similarity over lowercased whitespace tokens.
///
/// Both sides empty is a perfect match; exactly one side empty is a miss.
/// Symmetric by construction.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> BTreeSet<String> {
        s.split_whitespace().map(|t| t.to_lowercase()).collect()
    };
    let set_a = tokens(a);
    let set_b = tokens(b);

    match (set_a.is_empty(), set_b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let intersection = set_a.intersection(&set_b).count() as f64;
            let union = set_a.union(&set_b).count() as f64;
            intersection / union
        }
    }
}

/// Score a prediction against ground truth.
pub fn score(expected: &GroundTruth, predicted: &ParsedFields) -> MetricResult {
    let root_cause = token_set_similarity(&expected.root_cause, &predicted.root_cause);
    let severity = exact_match(&expected.severity, &predicted.severity);
    let component = token_set_similarity(&expected.component, &predicted.component);
    let summary = token_set_similarity(&expected.summary, &predicted.summary);
    let action_needed = exact_match(&expected.action_needed, &predicted.action_needed);

    let overall = root_cause * WEIGHT_ROOT_CAUSE
        + action_needed * WEIGHT_ACTION_NEEDED
        + severity * WEIGHT_SEVERITY
        + summary * WEIGHT_SUMMARY
        + component * WEIGHT_COMPONENT;

    MetricResult {
        root_cause,
        severity,
        component,
        summary,
        action_needed,
        overall,
    }
}

/// Field-wise means across a non-empty result set.
///
/// An average over zero samples must not silently report 0, so empty input
/// is an error.
pub fn aggregate(results: &[MetricResult]) -> Result<MetricResult, LogEvalError> {
    if results.is_empty() {
        return Err(LogEvalError::EmptyResultSet);
    }
    let n = results.len() as f64;
    let mean = |f: fn(&MetricResult) -> f64| results.iter().map(f).sum::<f64>() / n;
    Ok(MetricResult {
        root_cause: mean(|r| r.root_cause),
        severity: mean(|r| r.severity),
        component: mean(|r| r.component),
        summary: mean(|r| r.summary),
        action_needed: mean(|r| r.action_needed),
        overall: mean(|r| r.overall),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_truth() -> GroundTruth {
        GroundTruth {
            root_cause: "container killed after exceeding memory limit".into(),
            severity: "critical".into(),
            component: "jellyfin".into(),
            summary: "jellyfin pod crash looping after OOM kills".into(),
            action_needed: "investigate".into(),
        }
    }

    fn prediction(fields: [&str; 5]) -> ParsedFields {
        ParsedFields {
            root_cause: fields[0].into(),
            severity: fields[1].into(),
            component: fields[2].into(),
            summary: fields[3].into(),
            action_needed: fields[4].into(),
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_ROOT_CAUSE
            + WEIGHT_ACTION_NEEDED
            + WEIGHT_SEVERITY
            + WEIGHT_SUMMARY
            + WEIGHT_COMPONENT;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_match_case_and_whitespace_insensitive() {
        assert_eq!(exact_match("ERROR", "error"), 1.0);
        assert_eq!(exact_match("  error  ", "error"), 1.0);
        assert_eq!(exact_match("error", "warn"), 0.0);
    }

    #[test]
    fn test_token_set_similarity_symmetric() {
        let a = "memory limit exceeded in pod";
        let b = "pod exceeded its memory limit";
        assert_eq!(token_set_similarity(a, b), token_set_similarity(b, a));
    }

    #[test]
    fn test_token_set_similarity_identical() {
        assert_eq!(token_set_similarity("disk full", "Disk Full"), 1.0);
    }

    #[test]
    fn test_token_set_similarity_disjoint() {
        assert_eq!(token_set_similarity("disk full", "dns timeout"), 0.0);
    }

    #[test]
    fn test_token_set_similarity_empty_rules() {
        assert_eq!(token_set_similarity("", ""), 1.0);
        assert_eq!(token_set_similarity("  ", "\t"), 1.0);
        assert_eq!(token_set_similarity("", "something"), 0.0);
        assert_eq!(token_set_similarity("something", ""), 0.0);
    }

    #[test]
    fn test_token_set_similarity_partial_overlap() {
        // {a, b} vs {b, c}: intersection 1, union 3.
        let s = token_set_similarity("a b", "b c");
        assert!((s - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_prediction_scores_one() {
        let gt = ground_truth();
        let pred = prediction([
            "container killed after exceeding memory limit",
            "CRITICAL",
            "jellyfin",
            "jellyfin pod crash looping after OOM kills",
            "investigate",
        ]);
        let m = score(&gt, &pred);
        assert!((m.overall - 1.0).abs() < 1e-12);
        assert_eq!(m.severity, 1.0);
        assert_eq!(m.action_needed, 1.0);
    }

    #[test]
    fn test_all_wrong_scores_zero() {
        let gt = ground_truth();
        let pred = prediction(["dns timeout", "info", "coredns", "lookups failing", "monitor"]);
        let m = score(&gt, &pred);
        assert_eq!(m.overall, 0.0);
    }

    #[test]
    fn test_overall_is_weighted_sum() {
        let gt = ground_truth();
        // Only severity correct: overall should equal the severity weight.
        let pred = prediction(["x", "critical", "y", "z", "monitor"]);
        let m = score(&gt, &pred);
        assert!((m.overall - WEIGHT_SEVERITY).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_empty_fails() {
        let err = aggregate(&[]).unwrap_err();
        assert!(matches!(err, LogEvalError::EmptyResultSet));
    }

    #[test]
    fn test_aggregate_single_is_identity() {
        let gt = ground_truth();
        let m = score(&gt, &prediction(["x", "critical", "y", "z", "investigate"]));
        let agg = aggregate(std::slice::from_ref(&m)).unwrap();
        assert_eq!(agg, m);
    }

    #[test]
    fn test_aggregate_means_fields() {
        let a = MetricResult {
            root_cause: 1.0,
            severity: 1.0,
            component: 1.0,
            summary: 1.0,
            action_needed: 1.0,
            overall: 1.0,
        };
        let b = MetricResult::zero();
        let agg = aggregate(&[a, b]).unwrap();
        assert!((agg.overall - 0.5).abs() < 1e-12);
        assert!((agg.root_cause - 0.5).abs() < 1e-12);
    }
}
