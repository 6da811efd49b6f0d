use super::{percent, probability};
use crate::models::{AnalysisResult, ProviderId, Tag};
use serde_json::Value;

const TOP_CONCEPTS: usize = 10;

pub(super) fn normalize(raw: &Value) -> AnalysisResult {
    let mut result = AnalysisResult::empty(ProviderId::Clarifai);

    result.tags = raw
        .pointer("/outputs/0/data/concepts")
        .and_then(Value::as_array)
        .map(|concepts| concepts.iter().filter_map(concept_tag).collect())
        .unwrap_or_default();

    if result.tags.is_empty() {
        result.description = "No concepts detected".to_string();
        return result;
    }

    let top: Vec<&Tag> = result.tags.iter().take(TOP_CONCEPTS).collect();
    result.description = format!(
        "Top {} detected concepts: {}",
        top.len(),
        top.iter()
            .map(|t| t.label.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    result.full_analysis_text = result
        .tags
        .iter()
        .map(|t| format!("{}: {}", t.label, percent(t.score)))
        .collect::<Vec<_>>()
        .join("\n");

    result
}

fn concept_tag(concept: &Value) -> Option<Tag> {
    let name = concept.get("name")?.as_str()?;
    Some(Tag::new(name, probability(concept.get("value")).unwrap_or(0.0)))
}
