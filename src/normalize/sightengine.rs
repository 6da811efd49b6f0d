use super::{max_probability, percent, probability};
use crate::models::{AnalysisResult, ProviderId, SafetyScores};
use serde_json::Value;

const NUDITY_KEYS: [&str; 3] = ["nudity", "nudity-2.1", "nudity_2_1"];
const OFFENSIVE_KEYS: [&str; 3] = ["offensive", "offensive-2.0", "offensive_2_0"];

const EXPLICIT_CATEGORIES: [&str; 3] = ["sexual_activity", "sexual_display", "erotica"];
const SUGGESTIVE_CATEGORIES: [&str; 3] = ["very_suggestive", "suggestive", "mildly_suggestive"];

pub(super) fn normalize(raw: &Value, threshold: f64) -> AnalysisResult {
    let mut result = AnalysisResult::empty(ProviderId::Sightengine);

    result.safety = first_object(raw, &NUDITY_KEYS).map(safety_scores);
    result.offensive_probability = first_object(raw, &OFFENSIVE_KEYS).map(offensive_probability);

    let score = probability(raw.pointer("/type/ai_generated"));
    result.ai_confidence = score;
    result.is_ai_generated = score.map(|s| s > threshold);

    match score {
        Some(score) => {
            let is_ai = score > threshold;
            result.description = format!(
                "This image is {}. AI generation probability: {}",
                if is_ai { "likely AI-generated" } else { "likely a real photo" },
                percent(score)
            );
            result.full_analysis_text = full_analysis(score, is_ai, threshold);
        }
        None => {
            tracing::debug!("Sightengine response has no type.ai_generated score");
            result.description = "AI detection analysis completed.".to_string();
            result.full_analysis_text = "AI detection analysis was completed, but no score was available. \
                Ensure the \"genai\" model is enabled in the Sightengine request."
                .to_string();
        }
    }

    result
}

fn first_object<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| value.is_object())
}

fn category_max(nudity: &Value, categories: &[&str]) -> Option<f64> {
    max_probability(categories.iter().map(|c| probability(nudity.get(*c))))
}

/// nudity-2.1 categories, or the legacy `safe/raw/partial` keys.
fn safety_scores(nudity: &Value) -> SafetyScores {
    SafetyScores {
        safe: probability(nudity.get("none"))
            .or_else(|| probability(nudity.get("safe")))
            .unwrap_or(0.0),
        raw: category_max(nudity, &EXPLICIT_CATEGORIES)
            .or_else(|| probability(nudity.get("raw")))
            .unwrap_or(0.0),
        partial: category_max(nudity, &SUGGESTIVE_CATEGORIES)
            .or_else(|| probability(nudity.get("partial")))
            .unwrap_or(0.0),
    }
}

/// Legacy single `prob`, else the strongest offensive category.
fn offensive_probability(offensive: &Value) -> f64 {
    probability(offensive.get("prob"))
        .or_else(|| {
            let values = offensive.as_object()?.values();
            max_probability(values.map(|v| probability(Some(v))))
        })
        .unwrap_or(0.0)
}

fn full_analysis(score: f64, is_ai: bool, threshold: f64) -> String {
    let (status, verdict, reasoning) = if is_ai {
        (
            "AI Generated",
            "likely generated by artificial intelligence",
            "AI-generated images typically show patterns, artifacts, or characteristics that distinguish them from real photographs.",
        )
    } else {
        (
            "Real Photo",
            "likely a genuine photograph",
            "Real photographs typically show natural variation, realistic lighting, and authentic detail.",
        )
    };

    format!(
        "AI Detection Analysis (Sightengine):\n\n\
         Status: {status}\n\
         AI Generation Probability: {pct}\n\
         Raw Score: {score:.4} (0.0 = Real, 1.0 = AI)\n\
         Threshold Used: {threshold} (scores above this are considered AI-generated)\n\n\
         The Sightengine AI detection model determined that this image is {verdict} \
         with an AI generation probability of {pct}. {reasoning}",
        pct = percent(score),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const THRESHOLD: f64 = 0.3;

    #[test]
    fn test_nudity_categories_map_to_safety_scores() {
        let raw = json!({ "nudity": { "none": 0.95, "sexual_activity": 0.02 } });
        let result = normalize(&raw, THRESHOLD);

        assert_eq!(
            result.safety,
            Some(SafetyScores { safe: 0.95, raw: 0.02, partial: 0.0 })
        );
    }

    #[test]
    fn test_explicit_and_suggestive_take_category_max() {
        let raw = json!({ "nudity": {
            "none": 0.5,
            "sexual_activity": 0.01,
            "sexual_display": 0.07,
            "erotica": 0.03,
            "very_suggestive": 0.1,
            "suggestive": 0.25,
            "mildly_suggestive": 0.04
        }});
        let safety = normalize(&raw, THRESHOLD).safety.unwrap();
        assert_eq!(safety.raw, 0.07);
        assert_eq!(safety.partial, 0.25);
    }

    #[test]
    fn test_alternate_nudity_key_and_legacy_fields() {
        let raw = json!({ "nudity-2.1": { "safe": 0.97, "raw": 0.01, "partial": 0.02 } });
        assert_eq!(
            normalize(&raw, THRESHOLD).safety,
            Some(SafetyScores { safe: 0.97, raw: 0.01, partial: 0.02 })
        );
    }

    #[test]
    fn test_high_ai_score_is_ai_generated() {
        let result = normalize(&json!({ "type": { "ai_generated": 0.85 } }), THRESHOLD);

        assert_eq!(result.is_ai_generated, Some(true));
        assert_eq!(result.ai_confidence, Some(0.85));
        assert_eq!(
            result.description,
            "This image is likely AI-generated. AI generation probability: 85.0%"
        );
        assert!(result.full_analysis_text.contains("Raw Score: 0.8500"));
        assert!(result.full_analysis_text.contains("Threshold Used: 0.3"));
    }

    #[test]
    fn test_low_ai_score_is_real_photo() {
        let result = normalize(&json!({ "type": { "ai_generated": 0.2 } }), THRESHOLD);

        assert_eq!(result.is_ai_generated, Some(false));
        assert_eq!(result.ai_confidence, Some(0.2));
        assert!(result.description.contains("likely a real photo"));
    }

    #[test]
    fn test_score_at_threshold_is_not_ai() {
        let result = normalize(&json!({ "type": { "ai_generated": 0.3 } }), THRESHOLD);
        assert_eq!(result.is_ai_generated, Some(false));
    }

    #[test]
    fn test_offensive_prob_and_category_max() {
        let legacy = normalize(&json!({ "offensive": { "prob": 0.12 } }), THRESHOLD);
        assert_eq!(legacy.offensive_probability, Some(0.12));

        let categories = normalize(
            &json!({ "offensive": { "nazi": 0.01, "middle_finger": 0.4, "supremacist": 0.02 } }),
            THRESHOLD,
        );
        assert_eq!(categories.offensive_probability, Some(0.4));
    }

    #[test]
    fn test_missing_sections_stay_null() {
        let result = normalize(&json!({ "status": "success" }), THRESHOLD);

        assert_eq!(result.safety, None);
        assert_eq!(result.offensive_probability, None);
        assert_eq!(result.is_ai_generated, None);
        assert_eq!(result.ai_confidence, None);
        assert!(result.full_analysis_text.contains("genai"));
    }

    #[test]
    fn test_malformed_nested_values_degrade_to_zero() {
        let raw = json!({ "nudity": { "none": "high" }, "offensive": { "prob": null } });
        let result = normalize(&raw, THRESHOLD);
        assert_eq!(result.safety, Some(SafetyScores::default()));
        assert_eq!(result.offensive_probability, Some(0.0));
    }
}
