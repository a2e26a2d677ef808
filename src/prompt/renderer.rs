// src/prompt/renderer.rs — Pure template rendering for prompt configs
//
// Rendering is textual substitution only: templates are rendered with
// strict-undefined behavior so a typo'd variable fails loudly instead of
// disappearing into the prompt as an empty string. No network, no I/O.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};

use super::PromptConfig;
use crate::infra::errors::LogEvalError;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system_text: String,
    pub user_text: String,
}

/// Render a config's system and user templates with the given variables.
///
/// Optional inputs supply defaults that provided variables override. Any
/// absent required input fails with `MissingVariable` naming the key,
/// before the template engine is touched.
pub fn render(
    config: &PromptConfig,
    variables: &BTreeMap<String, String>,
) -> Result<RenderedPrompt, LogEvalError> {
    for required in &config.required_inputs {
        if !variables.contains_key(required) {
            return Err(LogEvalError::MissingVariable {
                prompt_id: config.id.clone(),
                variable: required.clone(),
            });
        }
    }

    let mut merged = config.optional_inputs.clone();
    for (k, v) in variables {
        merged.insert(k.clone(), v.clone());
    }

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let system_text = render_one(&env, &config.system_template, &merged, config, "system")?;
    let user_text = render_one(&env, &config.user_template, &merged, config, "user")?;

    Ok(RenderedPrompt {
        system_text,
        user_text,
    })
}

fn render_one(
    env: &Environment<'_>,
    template: &str,
    vars: &BTreeMap<String, String>,
    config: &PromptConfig,
    which: &str,
) -> Result<String, LogEvalError> {
    env.render_str(template, vars).map_err(|e| {
        LogEvalError::Config(format!(
            "failed to render {which} template of config {}: {e}",
            config.short_id()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ModelParams;

    fn config() -> PromptConfig {
        let mut optional = BTreeMap::new();
        optional.insert("cluster".to_string(), "homelab".to_string());
        PromptConfig::new(
            "k8s log analysis",
            "You analyze logs from the {{ cluster }} cluster.",
            "Namespace: {{ namespace }}\n\nLogs:\n{{ logs }}",
            vec!["logs".into(), "namespace".into()],
            optional,
            ModelParams::default(),
        )
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_with_all_required() {
        let rendered = render(
            &config(),
            &vars(&[("logs", "oom killed"), ("namespace", "media")]),
        )
        .unwrap();
        assert_eq!(rendered.system_text, "You analyze logs from the homelab cluster.");
        assert!(rendered.user_text.contains("Namespace: media"));
        assert!(rendered.user_text.contains("oom killed"));
    }

    #[test]
    fn test_missing_required_names_the_key() {
        let err = render(&config(), &vars(&[("logs", "x")])).unwrap_err();
        match err {
            LogEvalError::MissingVariable { variable, .. } => assert_eq!(variable, "namespace"),
            other => panic!("expected MissingVariable, got {other}"),
        }
    }

    #[test]
    fn test_optional_default_applied() {
        let rendered = render(&config(), &vars(&[("logs", "x"), ("namespace", "n")])).unwrap();
        assert!(rendered.system_text.contains("homelab"));
    }

    #[test]
    fn test_provided_overrides_optional_default() {
        let rendered = render(
            &config(),
            &vars(&[("logs", "x"), ("namespace", "n"), ("cluster", "prod")]),
        )
        .unwrap();
        assert!(rendered.system_text.contains("prod"));
        assert!(!rendered.system_text.contains("homelab"));
    }

    #[test]
    fn test_undeclared_template_variable_fails() {
        // Template references a variable that is neither required nor optional:
        // strict undefined must reject it rather than render an empty string.
        let bad = PromptConfig::new(
            "bad",
            "Cluster {{ missing_var }}",
            "{{ logs }}",
            vec!["logs".into()],
            BTreeMap::new(),
            ModelParams::default(),
        );
        let err = render(&bad, &vars(&[("logs", "x")])).unwrap_err();
        assert!(matches!(err, LogEvalError::Config(_)));
        assert!(err.to_string().contains(bad.short_id()));
    }

    #[test]
    fn test_render_is_pure() {
        let c = config();
        let v = vars(&[("logs", "a"), ("namespace", "b")]);
        assert_eq!(render(&c, &v).unwrap(), render(&c, &v).unwrap());
    }
}
