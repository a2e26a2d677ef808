// src/prompt/search_space.rs — Deterministic enumeration of candidate configs
//
// A search space is an ordered list of axes, each with a finite choice list.
// Candidates are the cartesian product in axis order, generated by linear
// index decomposition so enumeration is restartable and has no hidden
// iteration state. Bounded subsets are drawn with an explicit seeded RNG.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{ModelParams, PromptConfig};
use crate::infra::errors::LogEvalError;

/// Axis names that parameterize the model instead of the template text.
const PARAM_AXES: [&str; 3] = ["model", "temperature", "max_tokens"];

/// One discrete choice dimension of the search space.
///
/// A fragment axis substitutes its chosen value into the `{{ name }}` slot
/// of the base templates; the reserved axes `model`, `temperature` and
/// `max_tokens` set model parameters instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub choices: Vec<String>,
}

impl Axis {
    pub fn new(name: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            name: name.into(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn is_param(&self) -> bool {
        PARAM_AXES.contains(&self.name.as_str())
    }
}

/// Base templates every candidate is derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub description: String,
    pub system_template: String,
    pub user_template: String,
    pub required_inputs: Vec<String>,
    pub optional_inputs: BTreeMap<String, String>,
    pub model_defaults: ModelParams,
}

#[derive(Debug, Clone)]
pub struct SearchSpace {
    base: TemplateSpec,
    axes: Vec<Axis>,
}

impl SearchSpace {
    /// Validate and build a search space. Fails with a `Config` error naming
    /// the offending axis for empty choice lists, unparsable parameter
    /// choices, or fragment axes without a matching template slot.
    pub fn new(base: TemplateSpec, axes: Vec<Axis>) -> Result<Self, LogEvalError> {
        for axis in &axes {
            if axis.name.trim().is_empty() {
                return Err(LogEvalError::Config("search-space axis with empty name".into()));
            }
            if axis.choices.is_empty() {
                return Err(LogEvalError::Config(format!(
                    "search-space axis '{}' has no choices",
                    axis.name
                )));
            }
            if axis.is_param() {
                for choice in &axis.choices {
                    validate_param_choice(&axis.name, choice)?;
                }
            } else {
                let slot = slot_token(&axis.name);
                if !base.system_template.contains(&slot) && !base.user_template.contains(&slot) {
                    return Err(LogEvalError::Config(format!(
                        "axis '{}' has no '{slot}' slot in the base templates",
                        axis.name
                    )));
                }
            }
        }
        Ok(Self { base, axes })
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Total number of candidates (product of axis sizes).
    pub fn total(&self) -> usize {
        self.axes.iter().map(|a| a.choices.len()).product()
    }
}

/// Deterministic, restartable candidate enumeration over a search space.
pub struct CandidateGenerator {
    space: SearchSpace,
}

impl CandidateGenerator {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }

    pub fn total(&self) -> usize {
        self.space.total()
    }

    /// The candidate at a linear index, decomposed over axes in input order
    /// with the last axis varying fastest.
    pub fn candidate(&self, index: usize) -> Result<PromptConfig, LogEvalError> {
        let total = self.total();
        if index >= total {
            return Err(LogEvalError::Config(format!(
                "candidate index {index} out of range (space has {total})"
            )));
        }

        let axes = &self.space.axes;
        let mut picks = vec![0usize; axes.len()];
        let mut remaining = index;
        for i in (0..axes.len()).rev() {
            let len = axes[i].choices.len();
            picks[i] = remaining % len;
            remaining /= len;
        }

        self.build(&picks)
    }

    /// All candidates in cartesian-product order.
    pub fn enumerate(&self) -> Result<Vec<PromptConfig>, LogEvalError> {
        (0..self.total()).map(|i| self.candidate(i)).collect()
    }

    /// A bounded subset of `n` candidates drawn without replacement using a
    /// seeded RNG. The same seed always returns the same ordered sequence.
    /// Falls back to full enumeration when `n` covers the space.
    pub fn sample(&self, n: usize, seed: u64) -> Result<Vec<PromptConfig>, LogEvalError> {
        let total = self.total();
        if n >= total {
            return self.enumerate();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, total, n)
            .into_iter()
            .map(|i| self.candidate(i))
            .collect()
    }

    fn build(&self, picks: &[usize]) -> Result<PromptConfig, LogEvalError> {
        let base = &self.space.base;
        let mut system = base.system_template.clone();
        let mut user = base.user_template.clone();
        let mut params = base.model_defaults.clone();
        let mut descriptors = Vec::with_capacity(picks.len());

        for (axis, &pick) in self.space.axes.iter().zip(picks) {
            let choice = &axis.choices[pick];
            descriptors.push(format!("{}={}", axis.name, choice));
            if axis.is_param() {
                apply_param(&mut params, &axis.name, choice)?;
            } else {
                let slot = slot_token(&axis.name);
                system = system.replace(&slot, choice);
                user = user.replace(&slot, choice);
            }
        }

        let description = if descriptors.is_empty() {
            base.description.clone()
        } else {
            format!("{} [{}]", base.description, descriptors.join(", "))
        };

        Ok(PromptConfig::new(
            description,
            system,
            user,
            base.required_inputs.clone(),
            base.optional_inputs.clone(),
            params,
        ))
    }
}

fn slot_token(axis_name: &str) -> String {
    format!("{{{{ {axis_name} }}}}")
}

fn validate_param_choice(axis: &str, choice: &str) -> Result<(), LogEvalError> {
    match axis {
        "temperature" => {
            choice.parse::<f32>().map_err(|_| {
                LogEvalError::Config(format!(
                    "axis 'temperature' choice '{choice}' is not a number"
                ))
            })?;
        }
        "max_tokens" => {
            choice.parse::<u32>().map_err(|_| {
                LogEvalError::Config(format!(
                    "axis 'max_tokens' choice '{choice}' is not an integer"
                ))
            })?;
        }
        _ => {}
    }
    Ok(())
}

fn apply_param(params: &mut ModelParams, axis: &str, choice: &str) -> Result<(), LogEvalError> {
    match axis {
        "model" => params.model = choice.to_string(),
        "temperature" => {
            params.temperature = choice.parse().map_err(|_| {
                LogEvalError::Config(format!(
                    "axis 'temperature' choice '{choice}' is not a number"
                ))
            })?;
        }
        "max_tokens" => {
            params.max_tokens = choice.parse().map_err(|_| {
                LogEvalError::Config(format!(
                    "axis 'max_tokens' choice '{choice}' is not an integer"
                ))
            })?;
        }
        _ => {}
    }
    Ok(())
}
