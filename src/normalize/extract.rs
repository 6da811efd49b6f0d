//! Layered JSON extraction for free-text model output.
//!
//! Strategies run in priority order and the first one yielding a JSON object
//! wins. Callers fall back to treating the text as prose when all of them miss.

use serde_json::{Map, Value};

type Strategy = fn(&str) -> Option<Map<String, Value>>;

const STRATEGIES: [(&str, Strategy); 2] = [
    ("strip_code_fences", strip_code_fences),
    ("outermost_braces", outermost_braces),
];

pub(crate) fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let object = strategy(text)?;
        tracing::trace!(strategy = name, "Extracted JSON object from model output");
        Some(object)
    })
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Whole text as JSON once markdown code fences are removed.
fn strip_code_fences(text: &str) -> Option<Map<String, Value>> {
    let cleaned = text
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "");
    parse_object(cleaned.trim())
}

/// Span from the first `{` to the last `}`.
fn outermost_braces(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_parses() {
        let object = extract_json_object(r#"{"description": "a cat"}"#).unwrap();
        assert_eq!(object["description"], "a cat");
    }

    #[test]
    fn test_fenced_json_parses() {
        let text = "```json\n{\"isAI\": true, \"aiConfidence\": 0.9}\n```";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["isAI"], true);
    }

    #[test]
    fn test_bare_fence_parses() {
        let object = extract_json_object("```\n{\"a\": 1}\n```\n").unwrap();
        assert_eq!(object["a"], 1);
    }

    #[test]
    fn test_object_embedded_in_prose_is_found() {
        let text = "Here is my analysis:\n{\"description\": \"sunset\", \"isAI\": false}\nHope it helps!";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["description"], "sunset");
    }

    #[test]
    fn test_prose_and_non_objects_yield_nothing() {
        assert!(extract_json_object("Just a photo of a dog.").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("{not json}").is_none());
    }
}
