//! # Template Resolution
//!
//! Resolves `{{...}}` data references embedded in string configuration values against
//! the execution's [`OutputsMap`]. Three reference forms are recognised, tried in this
//! order by leading sigil:
//!
//! - `{{@nodeId:Display Name.field.path}}`: canonical; the display name is cosmetic.
//!   `{{@nodeId.field.path}}` is accepted as well.
//! - `{{$nodeId.field.path}}`: legacy id form.
//! - `{{Label.field.path}}`: label form, matched case-insensitively against node labels.
//!
//! Resolution never fails. References that cannot be resolved keep their original
//! `{{...}}` text so the problem stays visible downstream.
//!
//! ```rust
//! use nodeflow_engine::templates::resolve_string;
//! use nodeflow_types::OutputsMap;
//! use serde_json::json;
//!
//! let mut outputs = OutputsMap::new();
//! outputs.insert("n1", "Fetch", json!({"value": 42}));
//!
//! assert_eq!(resolve_string("v={{@n1:Fetch.value}}", &outputs), "v=42");
//! assert_eq!(resolve_string("{{@n9:X.y}}", &outputs), "{{@n9:X.y}}");
//! ```

use nodeflow_types::{CONDITION_KEY, OutputsMap};
use serde_json::{Map, Value};

use crate::field_paths::{LookupMode, lookup};

const OPEN_MARKER: &str = "{{";
const CLOSE_MARKER: &str = "}}";

/// Object fields tried, in order, when an object is rendered into text.
const OBJECT_SUMMARY_FIELDS: [&str; 4] = ["title", "name", "id", "message"];

/// Parsed `{{...}}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateReference {
    /// `@nodeId[:Display][.path]`
    Canonical { node_id: String, path: String },
    /// `$nodeId[.path]`
    NodeId { node_id: String, path: String },
    /// `Label[.path]`
    Label { label: String, path: String },
}

impl TemplateReference {
    /// Parses a template expression (without delimiters).
    pub fn parse(expression: &str) -> Option<Self> {
        let expression = expression.trim();
        if let Some(rest) = expression.strip_prefix('@') {
            let (node_id, remainder) = split_identifier(rest)?;
            let path = match remainder.strip_prefix(':') {
                Some(display_and_path) => display_and_path.split_once('.').map(|(_, path)| path).unwrap_or(""),
                None => strip_path_separator(remainder),
            };
            return Some(Self::Canonical {
                node_id: node_id.to_string(),
                path: path.to_string(),
            });
        }
        if let Some(rest) = expression.strip_prefix('$') {
            let (node_id, remainder) = split_identifier(rest)?;
            if remainder.starts_with(':') {
                return None;
            }
            return Some(Self::NodeId {
                node_id: node_id.to_string(),
                path: strip_path_separator(remainder).to_string(),
            });
        }

        let split = expression.find(['.', '[']).unwrap_or(expression.len());
        let label = expression[..split].trim();
        if label.is_empty() {
            return None;
        }
        Some(Self::Label {
            label: label.to_string(),
            path: strip_path_separator(&expression[split..]).to_string(),
        })
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Self::Canonical { .. })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Canonical { path, .. } | Self::NodeId { path, .. } | Self::Label { path, .. } => path,
        }
    }

    /// Looks the reference up in `outputs`. `None` means unresolved (unknown node or a
    /// dead-end path); a resolved `null` is `Some(Value::Null)`.
    pub fn resolve(&self, outputs: &OutputsMap, mode: LookupMode) -> Option<Value> {
        let output = match self {
            Self::Canonical { node_id, .. } | Self::NodeId { node_id, .. } => outputs.get(node_id)?,
            Self::Label { label, .. } => outputs.find_by_label(label)?,
        };
        lookup(&output.data, self.path(), mode)
    }
}

fn split_identifier(text: &str) -> Option<(&str, &str)> {
    let end = text.find([':', '.', '[']).unwrap_or(text.len());
    let identifier = text[..end].trim();
    if identifier.is_empty() {
        return None;
    }
    Some((identifier, &text[end..]))
}

fn strip_path_separator(remainder: &str) -> &str {
    remainder.strip_prefix('.').unwrap_or(remainder)
}

/// Extracts the expressions of every terminated `{{...}}` marker, trimmed.
pub fn extract_template_expressions(value: &str) -> Vec<String> {
    let mut expressions = Vec::new();
    let mut remainder = value;

    while let Some(start) = remainder.find(OPEN_MARKER) {
        let after_start = &remainder[start + OPEN_MARKER.len()..];
        let Some(end) = after_start.find(CLOSE_MARKER) else {
            break;
        };
        expressions.push(after_start[..end].trim().to_string());
        remainder = &after_start[end + CLOSE_MARKER.len()..];
    }

    expressions
}

/// Renders a resolved value into substitution text.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(map) => OBJECT_SUMMARY_FIELDS
            .iter()
            .find_map(|field| map.get(*field).filter(|value| !value.is_null()))
            .map(format_value)
            .unwrap_or_else(|| value.to_string()),
    }
}

/// Replaces every resolvable `{{...}}` marker in `input` with its formatted value.
pub fn resolve_string(input: &str, outputs: &OutputsMap) -> String {
    let mut output = String::with_capacity(input.len());
    let mut remaining = input;

    while let Some(start) = remaining.find(OPEN_MARKER) {
        let (before, from_marker) = remaining.split_at(start);
        output.push_str(before);

        let Some(end) = from_marker.find(CLOSE_MARKER) else {
            output.push_str(from_marker);
            return output;
        };
        let marker_end = end + CLOSE_MARKER.len();
        let expression = &from_marker[OPEN_MARKER.len()..end];
        match TemplateReference::parse(expression).and_then(|reference| reference.resolve(outputs, LookupMode::Broadcast)) {
            Some(value) => output.push_str(&format_value(&value)),
            None => output.push_str(&from_marker[..marker_end]),
        }
        remaining = &from_marker[marker_end..];
    }

    output.push_str(remaining);
    output
}

/// Resolves templates in string leaves and nested object fields. Arrays and other
/// scalars are returned unchanged.
pub fn resolve_value(value: &Value, outputs: &OutputsMap) -> Value {
    match value {
        Value::String(text) if text.contains(OPEN_MARKER) => Value::String(resolve_string(text, outputs)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), resolve_value(nested, outputs)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Builds a node's effective input: every config entry resolved, except the
/// `condition` field which is copied verbatim.
pub fn resolve_config(config: &Map<String, Value>, outputs: &OutputsMap) -> Map<String, Value> {
    config
        .iter()
        .map(|(key, value)| {
            let resolved = if key == CONDITION_KEY {
                value.clone()
            } else {
                resolve_value(value, outputs)
            };
            (key.clone(), resolved)
        })
        .collect()
}

/// Unresolved template reference found in a config map.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnresolvedReference {
    /// Config path where the template was found, e.g. `headers.Authorization`.
    pub source_path: String,
    /// Raw template expression without delimiters.
    pub expression: String,
}

/// Lists the references [`resolve_config`] would leave unresolved.
pub fn collect_unresolved_references(config: &Map<String, Value>, outputs: &OutputsMap) -> Vec<UnresolvedReference> {
    let mut unresolved = Vec::new();
    for (key, value) in config {
        if key != CONDITION_KEY {
            collect_unresolved_from_value(value, key, outputs, &mut unresolved);
        }
    }
    unresolved
}

fn collect_unresolved_from_value(value: &Value, source_path: &str, outputs: &OutputsMap, unresolved: &mut Vec<UnresolvedReference>) {
    match value {
        Value::String(text) => {
            for expression in extract_template_expressions(text) {
                let resolved = TemplateReference::parse(&expression).and_then(|reference| reference.resolve(outputs, LookupMode::Broadcast));
                if resolved.is_none() {
                    unresolved.push(UnresolvedReference {
                        source_path: source_path.to_string(),
                        expression,
                    });
                }
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                collect_unresolved_from_value(nested, &format!("{source_path}.{key}"), outputs, unresolved);
            }
        }
        _ => {}
    }
}
