// src/evaluator/parser.rs — Tolerant extraction of analysis fields from LLM output
//
// Model output is unreliable free text; one malformed response must not
// abort a multi-hour sweep. Parsing is line-oriented, case-insensitive
// label matching: a line containing "severity:" assigns its remainder,
// with surrounding markdown decoration stripped. Unresolved fields default
// to the "unknown" sentinel and parsing never fails.

use serde::{Deserialize, Serialize};

/// Sentinel for fields the parser could not resolve.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub root_cause: String,
    pub severity: String,
    pub component: String,
    pub summary: String,
    pub action_needed: String,
}

impl ParsedFields {
    pub fn unknown() -> Self {
        Self {
            root_cause: UNKNOWN.into(),
            severity: UNKNOWN.into(),
            component: UNKNOWN.into(),
            summary: UNKNOWN.into(),
            action_needed: UNKNOWN.into(),
        }
    }

    /// Names of fields still carrying the sentinel value.
    pub fn unresolved(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.root_cause == UNKNOWN {
            missing.push("root_cause");
        }
        if self.severity == UNKNOWN {
            missing.push("severity");
        }
        if self.component == UNKNOWN {
            missing.push("component");
        }
        if self.summary == UNKNOWN {
            missing.push("summary");
        }
        if self.action_needed == UNKNOWN {
            missing.push("action_needed");
        }
        missing
    }
}

/// Extract the five analysis fields from raw model output.
pub fn parse(raw_text: &str) -> ParsedFields {
    let mut fields = ParsedFields::unknown();

    for line in raw_text.lines() {
        let Some((label, value)) = split_labeled_line(line) else {
            continue;
        };
        let value = clean_value(value);
        if value.is_empty() {
            continue;
        }
        // First occurrence wins; later repetitions are ignored.
        match label.as_str() {
            "root_cause" | "root cause" => assign(&mut fields.root_cause, value),
            "severity" => assign(&mut fields.severity, value),
            "component" => assign(&mut fields.component, value),
            "summary" => assign(&mut fields.summary, value),
            "action_needed" | "action needed" | "action" => {
                assign(&mut fields.action_needed, value)
            }
            _ => {}
        }
    }

    fields
}

fn assign(slot: &mut String, value: String) {
    if slot == UNKNOWN {
        *slot = value;
    }
}

/// Split a line into (normalized label, raw value) at the first colon.
fn split_labeled_line(line: &str) -> Option<(String, &str)> {
    let stripped = line
        .trim()
        .trim_start_matches(['-', '*', '#', '>', '•'])
        .trim_start();
    let (label, value) = stripped.split_once(':')?;

    let label = label
        .trim()
        .trim_matches(['*', '`', '"', '\''])
        .to_lowercase();
    // Labels are short words; a colon deep inside prose is not a label.
    if label.is_empty() || label.len() > 24 {
        return None;
    }
    Some((label, value))
}

/// Trim markdown decoration and quoting around a field value.
fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(['*', '`'])
        .trim_matches(['"', '\''])
        .trim()
        .to_string()
}
