//! Recovers one JSON object or array from free-form completion text.
//!
//! Completion output is unreliable: the value may be fenced, wrapped in prose or
//! missing entirely. Every outcome is normalized into [`Extracted`] here so
//! callers never inspect a dynamic shape, and nothing in this module fails.

use serde_json::{Map, Value};
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    Empty,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// `Empty` renders as `{}`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Object(map) => Value::Object(map),
            Self::Array(items) => Value::Array(items),
            Self::Empty => Value::Object(Map::new()),
        }
    }

    /// A single object, taking the first object element of an array.
    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            Self::Array(items) => items.into_iter().find_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            }),
            Self::Empty => None,
        }
    }

    /// Plan lists: an object becomes a one-element list, `Empty` an empty one.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Self::Object(map) => vec![Value::Object(map)],
            Self::Array(items) => items,
            Self::Empty => Vec::new(),
        }
    }
}

impl From<Value> for Extracted {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map),
            Value::Array(items) => Self::Array(items),
            _ => Self::Empty,
        }
    }
}

pub fn extract_json(text: &str) -> Extracted {
    let cleaned = strip_code_fence(text);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return value.into();
    }

    for opener in ['[', '{'] {
        let Some(start) = cleaned.find(opener) else {
            continue;
        };
        if let Some(candidate) = balanced_slice(&cleaned[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return value.into();
            }
        }
    }

    warn!(
        event_name = "agent.extract.failed",
        response_len = text.len(),
        response = %truncate(text, 200),
        "could not extract JSON from completion response"
    );
    Extracted::Empty
}

fn strip_code_fence(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest.strip_prefix("json").unwrap_or(rest);
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// `text` starts with an opening bracket. Returns the prefix up to its matching
/// close, ignoring brackets inside string literals.
fn balanced_slice(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..index + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_json, Extracted};

    #[test]
    fn plan_array_is_recovered_from_surrounding_prose() {
        let text = "Sure! [{\"tool_name\":\"restock_book\",\"parameters\":{\"isbn\":\"X\",\"quantity\":2}}] Done.";

        let extracted = extract_json(text);

        assert_eq!(
            extracted,
            Extracted::Array(vec![json!({
                "tool_name": "restock_book",
                "parameters": {"isbn": "X", "quantity": 2}
            })])
        );
    }

    #[test]
    fn fenced_object_is_parsed_directly() {
        let text = "```json\n{\"needs_tools\": true, \"tools_needed\": [\"find_books\"]}\n```";

        let object = extract_json(text).into_object().expect("object");

        assert_eq!(object.get("needs_tools"), Some(&json!(true)));
    }

    #[test]
    fn array_start_wins_over_an_earlier_object() {
        let text = "Plan {not json} then [1, 2]";

        assert_eq!(extract_json(text), Extracted::Array(vec![json!(1), json!(2)]));
    }

    #[test]
    fn object_is_used_when_no_array_parses() {
        let text = "Result: {\"reasoning\": \"uses [brackets] inside a string\"} trailing";

        let object = extract_json(text).into_object().expect("object");

        assert_eq!(object.get("reasoning"), Some(&json!("uses [brackets] inside a string")));
    }

    #[test]
    fn malformed_or_absent_json_is_empty() {
        for text in ["", "no structure here", "{\"unterminated\": ", "[1, 2", "]{", "null", "42"] {
            assert_eq!(extract_json(text), Extracted::Empty, "input: {text:?}");
        }
        assert_eq!(extract_json("nothing").into_value(), json!({}));
    }

    #[test]
    fn list_normalization_wraps_objects_and_empties() {
        assert_eq!(extract_json("{\"a\": 1}").into_list(), vec![json!({"a": 1})]);
        assert!(Extracted::Empty.into_list().is_empty());
    }

    #[test]
    fn nested_structures_and_escaped_quotes_round_trip() {
        let value = json!([
            {"tool_name": "create_order", "parameters": {"customer_id": 2, "items": [{"isbn": "9780134685991", "quantity": 2}]}},
            {"tool_name": "find_books", "parameters": {"title": "say \"hi\" }"}}
        ]);
        let text = format!("Here you go:\n```\n{value}\n``` hope that helps");

        assert_eq!(extract_json(&text).into_value(), value);
    }
}
