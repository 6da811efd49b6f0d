use super::extract::extract_json_object;
use crate::models::{AnalysisResult, ProviderId};
use crate::providers::gemini::candidate_text;
use serde_json::{Map, Value};

const DESCRIPTION_PREVIEW_CHARS: usize = 300;

pub(super) fn normalize(raw: &Value) -> AnalysisResult {
    let mut result = AnalysisResult::empty(ProviderId::Gemini);

    let Some(text) = candidate_text(raw).or_else(|| raw.as_str().map(str::to_string)) else {
        return result;
    };

    match extract_json_object(&text) {
        Some(object) => apply_fields(&mut result, &object, &text),
        None => {
            tracing::debug!("Gemini answer is not JSON, keeping it as text");
            result.description = preview(&text);
            result.full_analysis_text = text;
        }
    }

    result
}

fn apply_fields(result: &mut AnalysisResult, object: &Map<String, Value>, text: &str) {
    let description = non_empty_str(object.get("description"));

    result.is_ai_generated = object.get("isAI").and_then(as_flag);
    result.ai_confidence = object.get("aiConfidence").and_then(as_confidence);
    result.key_elements = object
        .get("keyElements")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    result.full_analysis_text = non_empty_str(object.get("fullAnalysis"))
        .or_else(|| description.clone())
        .unwrap_or_else(|| text.to_string());
    result.description = description.unwrap_or_else(|| preview(text));
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_confidence(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then(|| number.clamp(0.0, 1.0))
}

fn preview(text: &str) -> String {
    text.chars().take(DESCRIPTION_PREVIEW_CHARS).collect()
}
