//! Field-path parsing and lookup shared by template resolution and condition evaluation.
//!
//! A path is a dot-separated list of segments, where any segment may carry one or more
//! index suffixes (`items[0].name`, `matrix[1][2]`, or a bare `[0]`). Numeric dot
//! segments (`items.0.name`) index arrays as well.

use serde_json::Value;

/// Single step of a parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// How a field segment applied to an array is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Map the field access over every element and continue with the resulting array.
    Broadcast,
    /// A field access on an array is a dead end.
    Single,
}

/// Parses a field path into segments.
///
/// Returns `None` for malformed paths (unterminated or non-numeric brackets, empty
/// segments between dots). An empty path parses to no segments.
pub fn parse_field_path(path: &str) -> Option<Vec<PathSegment>> {
    let path = path.trim();
    let mut segments = Vec::new();
    if path.is_empty() {
        return Some(segments);
    }

    for raw_segment in path.split('.') {
        let raw_segment = raw_segment.trim();
        let (name, mut indices) = match raw_segment.find('[') {
            Some(bracket) => (&raw_segment[..bracket], &raw_segment[bracket..]),
            None => (raw_segment, ""),
        };
        if name.is_empty() && indices.is_empty() {
            return None;
        }
        if !name.is_empty() {
            segments.push(PathSegment::Field(name.to_string()));
        }
        while !indices.is_empty() {
            let inner = indices.strip_prefix('[')?;
            let close = inner.find(']')?;
            let index = inner[..close].trim().parse::<usize>().ok()?;
            segments.push(PathSegment::Index(index));
            indices = &inner[close + 1..];
        }
    }

    Some(segments)
}

/// Walks `segments` from `root`.
///
/// `null` propagates through any remaining segments. A missing object key, an
/// out-of-range index, or a field access on a scalar returns `None`.
pub fn select_path(root: &Value, segments: &[PathSegment], mode: LookupMode) -> Option<Value> {
    let mut current = root.clone();
    for segment in segments {
        current = match (current, segment) {
            (Value::Null, _) => return Some(Value::Null),
            (Value::Object(mut map), PathSegment::Field(name)) => map.remove(name)?,
            (Value::Array(items), PathSegment::Index(index)) => items.into_iter().nth(*index)?,
            (Value::Array(items), PathSegment::Field(name)) => {
                if let Ok(index) = name.parse::<usize>() {
                    items.into_iter().nth(index)?
                } else if mode == LookupMode::Broadcast {
                    Value::Array(items.into_iter().map(|item| field_or_null(item, name)).collect())
                } else {
                    return None;
                }
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Parses `path` and selects it from `root` in one step.
pub fn lookup(root: &Value, path: &str, mode: LookupMode) -> Option<Value> {
    let segments = parse_field_path(path)?;
    select_path(root, &segments, mode)
}

fn field_or_null(item: Value, name: &str) -> Value {
    match item {
        Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
