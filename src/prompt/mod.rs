// src/prompt/mod.rs — Prompt configurations with content-addressed identity

pub mod renderer;
pub mod search_space;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Model parameters a prompt config runs with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "llama-3.2-3b-instruct".into(),
            temperature: 0.1,
            max_tokens: 512,
        }
    }
}

impl ModelParams {
    /// Stable textual form used for content addressing.
    pub fn canonical(&self) -> String {
        format!("{}|{:.4}|{}", self.model, self.temperature, self.max_tokens)
    }
}

/// A candidate prompt/model configuration.
///
/// Identity is content-addressed: the id is a sha256 over the normalized
/// template text plus canonical model parameters, so identical content
/// always yields the same id regardless of how it was constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub id: String,
    pub description: String,
    pub system_template: String,
    pub user_template: String,
    pub required_inputs: Vec<String>,
    pub optional_inputs: BTreeMap<String, String>,
    pub model_defaults: ModelParams,
}

impl PromptConfig {
    pub fn new(
        description: impl Into<String>,
        system_template: impl Into<String>,
        user_template: impl Into<String>,
        required_inputs: Vec<String>,
        optional_inputs: BTreeMap<String, String>,
        model_defaults: ModelParams,
    ) -> Self {
        let system_template = system_template.into();
        let user_template = user_template.into();
        let id = content_hash(&system_template, &user_template, &model_defaults);
        Self {
            id,
            description: description.into(),
            system_template,
            user_template,
            required_inputs,
            optional_inputs,
            model_defaults,
        }
    }

    /// First 8 hex chars of the id, for log readability.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// sha256 over newline-normalized, trimmed template text and canonical
/// model parameters.
pub fn content_hash(system: &str, user: &str, params: &ModelParams) -> String {
    let canonical = format!(
        "{}\n{}\n{}",
        normalize(system),
        normalize(user),
        params.canonical()
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}
