//! # Condition Evaluation
//!
//! Evaluates the `condition` field of Condition nodes into a boolean. Evaluation is
//! total: every rejected, malformed, or faulting expression evaluates to `false`.
//!
//! Text conditions go through four stages:
//!
//! 1. a safety check on the raw text, with the inside of `{{...}}` markers masked
//! 2. substitution of each canonical `{{@nodeId:...}}` reference by a synthetic variable
//!    bound to the referenced value (the value is never spliced into the text)
//! 3. the same safety check on the substituted text, where braces are no longer allowed
//! 4. parsing and evaluation with the restricted grammar in [`parser`]
//!
//! ```rust
//! use nodeflow_engine::condition::evaluate_condition;
//! use nodeflow_types::OutputsMap;
//! use serde_json::json;
//!
//! let mut outputs = OutputsMap::new();
//! outputs.insert("t1", "Trigger", json!({"value": 20}));
//!
//! assert!(evaluate_condition(&json!("{{@t1:Trigger.value}} > 10"), &outputs));
//! assert!(!evaluate_condition(&json!("require('fs')"), &outputs));
//! ```

pub mod parser;

use std::collections::HashMap;

use nodeflow_types::{CONDITION_KEY, Graph, OutputsMap};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{field_paths::LookupMode, templates::TemplateReference};

/// Reasons a condition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("condition contains disallowed {0}")]
    Disallowed(String),

    #[error("condition could not be parsed: {0}")]
    Parse(String),

    #[error("condition of type {0} cannot be evaluated")]
    UnsupportedType(&'static str),
}

/// Identifiers that never appear in a legitimate condition.
const DENIED_WORDS: [&str; 11] = [
    "function",
    "import",
    "require",
    "eval",
    "new",
    "constructor",
    "prototype",
    "__proto__",
    "process",
    "globalThis",
    "this",
];

/// Rejected anywhere in the text, string literals included.
const DENIED_RAW_SEQUENCES: [(&str, &str); 2] = [("`", "back-tick"), ("${", "template interpolation '${'")];

/// Rejected outside string literals.
const DENIED_CODE_SEQUENCES: [(&str, &str); 2] = [(";", "statement separator ';'"), ("=>", "arrow function '=>'")];

/// Variable prefix for substituted references.
const REFERENCE_VARIABLE_PREFIX: &str = "__ref_";

/// Placeholder used for masked `{{...}}` markers during the first safety check.
const MASKED_REFERENCE: &str = "__ref";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier pattern"));
static CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_.]*\s*\(").expect("call pattern"));

fn is_allowed_char(character: char) -> bool {
    character.is_ascii_alphanumeric()
        || character.is_whitespace()
        || matches!(
            character,
            '_' | '.' | '[' | ']' | '(' | ')' | '\'' | '"' | '=' | '!' | '<' | '>' | '&' | '|' | '-'
        )
}

/// Replaces string literal contents with spaces so word checks only see code.
fn mask_string_literals(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    for character in text.chars() {
        match quote {
            Some(open) if character == open => {
                quote = None;
                masked.push(character);
            }
            Some(_) => masked.push(' '),
            None => {
                if character == '\'' || character == '"' {
                    quote = Some(character);
                }
                masked.push(character);
            }
        }
    }
    masked
}

/// Replaces each terminated `{{...}}` marker with a neutral identifier.
fn mask_references(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut remaining = text;
    while let Some(start) = remaining.find("{{") {
        let (before, from_marker) = remaining.split_at(start);
        masked.push_str(before);
        let Some(end) = from_marker.find("}}") else {
            masked.push_str(from_marker);
            return masked;
        };
        masked.push_str(MASKED_REFERENCE);
        remaining = &from_marker[end + 2..];
    }
    masked.push_str(remaining);
    masked
}

fn check_safety(text: &str) -> Result<(), ConditionError> {
    for (sequence, description) in DENIED_RAW_SEQUENCES {
        if text.contains(sequence) {
            return Err(ConditionError::Disallowed(description.to_string()));
        }
    }

    let code = mask_string_literals(text);
    for (sequence, description) in DENIED_CODE_SEQUENCES {
        if code.contains(sequence) {
            return Err(ConditionError::Disallowed(description.to_string()));
        }
    }
    if let Some(character) = code.chars().find(|&c| !is_allowed_char(c)) {
        return Err(ConditionError::Disallowed(format!("character '{character}'")));
    }
    for identifier in IDENTIFIER.find_iter(&code) {
        if DENIED_WORDS.contains(&identifier.as_str()) {
            return Err(ConditionError::Disallowed(format!("keyword '{}'", identifier.as_str())));
        }
    }
    if let Some(call) = CALL.find(&code) {
        return Err(ConditionError::Disallowed(format!("call '{}'", call.as_str().trim_end_matches('(').trim())));
    }
    if has_assignment(&code) {
        return Err(ConditionError::Disallowed("assignment '='".to_string()));
    }
    Ok(())
}

/// A lone `=` that is not part of `==`, `!=`, `<=`, `>=`, `===` or `!==`.
fn has_assignment(code: &str) -> bool {
    let chars: Vec<char> = code.chars().collect();
    chars.iter().enumerate().any(|(index, &character)| {
        if character != '=' {
            return false;
        }
        let previous = index.checked_sub(1).and_then(|i| chars.get(i)).copied();
        let next = chars.get(index + 1).copied();
        !matches!(previous, Some('=' | '!' | '<' | '>')) && next != Some('=')
    })
}

/// Text after substitution plus the variables it references.
struct Substituted {
    text: String,
    bindings: HashMap<String, Value>,
}

fn substitute_references(text: &str, outputs: &OutputsMap) -> Substituted {
    let mut output = String::with_capacity(text.len());
    let mut bindings = HashMap::new();
    let mut counter = 0usize;
    let mut remaining = text;

    while let Some(start) = remaining.find("{{") {
        let (before, from_marker) = remaining.split_at(start);
        output.push_str(before);
        let Some(end) = from_marker.find("}}") else {
            output.push_str(from_marker);
            remaining = "";
            break;
        };
        let marker_end = end + 2;
        match TemplateReference::parse(&from_marker[2..end]).filter(TemplateReference::is_canonical) {
            Some(reference) => {
                let name = loop {
                    let candidate = format!("{REFERENCE_VARIABLE_PREFIX}{counter}");
                    counter += 1;
                    if !text.contains(&candidate) {
                        break candidate;
                    }
                };
                let value = reference.resolve(outputs, LookupMode::Single).unwrap_or(Value::Null);
                output.push(' ');
                output.push_str(&name);
                output.push(' ');
                bindings.insert(name, value);
            }
            None => output.push_str(&from_marker[..marker_end]),
        }
        remaining = &from_marker[marker_end..];
    }
    output.push_str(remaining);

    Substituted { text: output, bindings }
}

fn prepare(text: &str, outputs: &OutputsMap) -> Result<(parser::Expr, HashMap<String, Value>), ConditionError> {
    check_safety(&mask_references(text))?;
    let substituted = substitute_references(text, outputs);
    check_safety(&substituted.text)?;
    let expr = parser::parse(&substituted.text, &substituted.bindings).map_err(ConditionError::Parse)?;
    Ok((expr, substituted.bindings))
}

/// Evaluates a condition, returning the reason when it is rejected.
pub fn try_evaluate_condition(expression: &Value, outputs: &OutputsMap) -> Result<bool, ConditionError> {
    match expression {
        Value::Bool(flag) => Ok(*flag),
        Value::Null => Ok(false),
        Value::Number(number) => Ok(number.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(text) => {
            let (expr, bindings) = prepare(text, outputs)?;
            Ok(parser::is_truthy(&parser::evaluate(&expr, &bindings)))
        }
        Value::Array(_) => Err(ConditionError::UnsupportedType("array")),
        Value::Object(_) => Err(ConditionError::UnsupportedType("object")),
    }
}

/// Evaluates a condition. Rejected conditions are reported at `warn` and yield `false`.
pub fn evaluate_condition(expression: &Value, outputs: &OutputsMap) -> bool {
    try_evaluate_condition(expression, outputs).unwrap_or_else(|error| {
        warn!(error = %error, "condition rejected; evaluating to false");
        false
    })
}

/// Runs the safety checks and the parser without evaluating.
pub fn validate_condition(expression: &str) -> Result<(), ConditionError> {
    prepare(expression, &OutputsMap::new()).map(|_| ())
}

/// Checks every enabled Condition node of `graph`, returning the ones that would be rejected.
pub fn validate_graph_conditions(graph: &Graph) -> Vec<(String, ConditionError)> {
    graph
        .nodes
        .iter()
        .filter(|node| node.enabled && node.is_condition())
        .filter_map(|node| {
            let outcome = match node.config.get(CONDITION_KEY) {
                Some(Value::String(text)) => validate_condition(text),
                Some(other) => try_evaluate_condition(other, &OutputsMap::new()).map(|_| ()),
                None => Ok(()),
            };
            outcome.err().map(|error| (node.id.clone(), error))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs() -> OutputsMap {
        let mut outputs = OutputsMap::new();
        outputs.insert("t1", "Trigger", json!({"value": 20, "status": "open", "items": [{"id": 1}]}));
        outputs.insert("n-2", "Fetch", json!({"ok": true, "note": "x; require('fs')"}));
        outputs
    }

    #[test]
    fn non_text_conditions_short_circuit() {
        let outputs = outputs();
        assert!(evaluate_condition(&json!(true), &outputs));
        assert!(!evaluate_condition(&json!(false), &outputs));
        assert!(!evaluate_condition(&Value::Null, &outputs));
        assert!(evaluate_condition(&json!(2), &outputs));
        assert!(!evaluate_condition(&json!({"a": 1}), &outputs));
    }

    #[test]
    fn evaluates_plain_and_referenced_comparisons() {
        let outputs = outputs();
        assert!(evaluate_condition(&json!("5 > 3"), &outputs));
        assert!(evaluate_condition(&json!("{{@t1:Trigger.value}} > 10"), &outputs));
        assert!(!evaluate_condition(&json!("{{@t1:Trigger.value}} < 10"), &outputs));
        assert!(evaluate_condition(&json!("{{@t1:Trigger.status}} == 'open' && {{@n-2:Fetch.ok}}"), &outputs));
        assert!(evaluate_condition(&json!("{{@t1:Trigger.items[0].id}} === 1"), &outputs));
    }

    #[test]
    fn rejects_code_before_substitution() {
        let outputs = outputs();
        for expression in [
            "function() { return true }",
            "require('child_process')",
            "import('x')",
            "(() => true)()",
            "1; 2",
            "`${1}`",
            "x = 1",
            "this.constructor",
            "{{@t1:Trigger.value}}.toString()",
            "1 + 1 == 2",
        ] {
            assert!(!evaluate_condition(&json!(expression), &outputs), "{expression} should be rejected");
            assert!(matches!(validate_condition(expression), Err(ConditionError::Disallowed(_))), "{expression}");
        }
    }

    #[test]
    fn referenced_values_are_never_reparsed() {
        let outputs = outputs();
        assert_eq!(try_evaluate_condition(&json!("{{@n-2:Fetch.note}} == 'x'"), &outputs), Ok(false));
        assert!(evaluate_condition(&json!("{{@n-2:Fetch.note}} != 'other'"), &outputs));
    }

    #[test]
    fn missing_references_bind_null() {
        let outputs = outputs();
        assert!(!evaluate_condition(&json!("{{@ghost:Gone.value}} > 10"), &outputs));
        assert!(evaluate_condition(&json!("{{@ghost:Gone.value}} == null"), &outputs));
        assert!(!evaluate_condition(&json!("{{@t1:Trigger.value.deep}} > 1"), &outputs));
    }

    #[test]
    fn non_canonical_references_fail_post_check() {
        let outputs = outputs();
        assert!(!evaluate_condition(&json!("{{$t1.value}} > 10"), &outputs));
        assert!(matches!(
            try_evaluate_condition(&json!("{{Trigger.value}} > 10"), &outputs),
            Err(ConditionError::Disallowed(_))
        ));
    }

    #[test]
    fn synthetic_names_avoid_existing_text() {
        let substituted = substitute_references("__ref_0 == {{@t1:Trigger.value}}", &outputs());
        assert!(substituted.bindings.contains_key("__ref_1"));
        assert!(!substituted.bindings.contains_key("__ref_0"));
    }

    #[test]
    fn string_literals_may_contain_denied_words() {
        assert!(evaluate_condition(&json!("{{@t1:Trigger.status}} != 'new'"), &outputs()));
    }

    #[test]
    fn string_literals_may_contain_punctuation_and_unicode() {
        let mut outputs = OutputsMap::new();
        outputs.insert(
            "n1",
            "Fetch",
            json!({"email": "ops@example.com", "url": "https://x.io/a?b=1", "pair": "a,b", "city": "Zürich", "note": "x; y"}),
        );
        assert!(evaluate_condition(&json!("{{@n1:Fetch.email}} == 'ops@example.com'"), &outputs));
        assert!(evaluate_condition(&json!("{{@n1:Fetch.url}} == \"https://x.io/a?b=1\""), &outputs));
        assert!(evaluate_condition(&json!("{{@n1:Fetch.pair}} == 'a,b'"), &outputs));
        assert!(evaluate_condition(&json!("{{@n1:Fetch.city}} == 'Zürich'"), &outputs));
        assert!(evaluate_condition(&json!("{{@n1:Fetch.note}} == 'x; y'"), &outputs));
        assert!(!evaluate_condition(&json!("{{@n1:Fetch.email}} == 'other@example.com'"), &outputs));
    }

    #[test]
    fn literals_do_not_hide_interpolation_or_code_outside_them() {
        let outputs = outputs();
        assert!(matches!(validate_condition("'${x}' == 'a'"), Err(ConditionError::Disallowed(_))));
        assert!(matches!(validate_condition("'a' == 'a' @ 1"), Err(ConditionError::Disallowed(_))));
        assert!(!evaluate_condition(&json!("'a' == 'a'; 1"), &outputs));
    }

    #[test]
    fn validate_reports_parse_errors() {
        assert!(validate_condition("{{@a:A.x}} > 1").is_ok());
        assert!(matches!(validate_condition("1 >"), Err(ConditionError::Parse(_))));
        assert!(matches!(validate_condition(""), Err(ConditionError::Parse(_))));
        let chain = vec!["1 == 1"; 5_000].join(" && ");
        assert!(matches!(validate_condition(&chain), Err(ConditionError::Parse(_))));
    }

    #[test]
    fn graph_validation_lists_rejected_conditions() {
        use nodeflow_types::Node;

        let graph = Graph::new(
            vec![
                Node::trigger("t1", "Start"),
                Node::action("ok", "Ok", "Condition").with_config(CONDITION_KEY, json!("{{@t1:Start.value}} > 1")),
                Node::action("bad", "Bad", "Condition").with_config(CONDITION_KEY, json!("require('fs')")),
                Node::action("off", "Off", "Condition").with_config(CONDITION_KEY, json!("eval(1)")).disabled(),
                Node::action("shape", "Shape", "Condition").with_config(CONDITION_KEY, json!([1])),
            ],
            vec![],
        );
        let rejected: Vec<String> = validate_graph_conditions(&graph).into_iter().map(|(id, _)| id).collect();
        assert_eq!(rejected, ["bad", "shape"]);
    }
}
