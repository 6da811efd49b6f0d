use super::{percent, probability};
use crate::models::{AnalysisResult, ProviderId, Tag};
use serde_json::Value;

pub(super) fn normalize(raw: &Value) -> AnalysisResult {
    let mut result = AnalysisResult::empty(ProviderId::HuggingFace);

    // Some models wrap the label list in an outer array.
    let items = match raw {
        Value::Array(items) if items.first().is_some_and(Value::is_array) => {
            items[0].as_array().cloned().unwrap_or_default()
        }
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    };

    let mut tags: Vec<Tag> = items.iter().filter_map(label_tag).collect();
    tags.sort_by(|a, b| b.score.total_cmp(&a.score));
    result.tags = tags;

    match result.tags.first() {
        Some(top) => {
            result.description = format!("Top label: {} ({})", top.label, percent(top.score));
            result.full_analysis_text = result
                .tags
                .iter()
                .map(|t| format!("{}: {}", t.label, percent(t.score)))
                .collect::<Vec<_>>()
                .join("\n");
        }
        None => result.description = "No labels returned".to_string(),
    }

    result
}

fn label_tag(item: &Value) -> Option<Tag> {
    let label = item.get("label")?.as_str()?;
    Some(Tag::new(label, probability(item.get("score")).unwrap_or(0.0)))
}
