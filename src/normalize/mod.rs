//! Maps each provider's raw JSON into the canonical `AnalysisResult`.
//!
//! Normalisation never fails. Fields a provider does not supply stay at their
//! defaults, and nested structures that do not have the expected shape are
//! ignored rather than rejected.

mod clarifai;
pub(crate) mod extract;
mod gemini;
mod huggingface;
mod sightengine;

use crate::config::AnalysisPolicy;
use crate::models::{AnalysisResult, ProviderId};
use crate::providers::ProviderOutcome;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Normalizer {
    ai_generated_threshold: f64,
}

impl Normalizer {
    pub fn new(policy: &AnalysisPolicy) -> Self {
        Self {
            ai_generated_threshold: policy.ai_generated_threshold,
        }
    }

    pub fn normalize(&self, provider: ProviderId, outcome: ProviderOutcome) -> AnalysisResult {
        match outcome {
            ProviderOutcome::Failure(error) => AnalysisResult::failed(provider, error),
            ProviderOutcome::Success { raw, model } => {
                let mut result = match provider {
                    ProviderId::Gemini => gemini::normalize(&raw),
                    ProviderId::Sightengine => {
                        sightengine::normalize(&raw, self.ai_generated_threshold)
                    }
                    ProviderId::Clarifai => clarifai::normalize(&raw),
                    ProviderId::HuggingFace => huggingface::normalize(&raw),
                };
                result.model = Some(model);
                result
            }
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&AnalysisPolicy::default())
    }
}

/// Normalise with the default policy.
pub fn normalize(provider: ProviderId, outcome: ProviderOutcome) -> AnalysisResult {
    Normalizer::default().normalize(provider, outcome)
}

/// A finite JSON number clamped into [0, 1].
pub(crate) fn probability(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

/// Largest of the present probabilities, `None` if none are present.
pub(crate) fn max_probability<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values.into_iter().flatten().reduce(f64::max)
}

pub(crate) fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}
