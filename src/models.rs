//! Data models and structures
//!
//! Defines the canonical, provider-agnostic analysis records that every
//! provider response is normalised into, plus the provider identifiers used
//! to select and key them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One external image-analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    Sightengine,
    Clarifai,
    HuggingFace,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Gemini,
        ProviderId::Sightengine,
        ProviderId::Clarifai,
        ProviderId::HuggingFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Sightengine => "sightengine",
            ProviderId::Clarifai => "clarifai",
            ProviderId::HuggingFace => "huggingface",
        }
    }

    /// Human-facing vendor name used in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "Gemini",
            ProviderId::Sightengine => "Sightengine",
            ProviderId::Clarifai => "Clarifai",
            ProviderId::HuggingFace => "HuggingFace",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderId::Gemini),
            "sightengine" => Ok(ProviderId::Sightengine),
            "clarifai" => Ok(ProviderId::Clarifai),
            "huggingface" | "hf" => Ok(ProviderId::HuggingFace),
            other => Err(format!(
                "Unknown provider '{}'. Expected one of: gemini, sightengine, clarifai, huggingface",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Missing or invalid credentials; detected before any network call.
    Configuration,
    /// Non-2xx responses, exhausted retries, exhausted model lists.
    Provider,
    /// The provider call panicked or was cancelled.
    Internal,
}

/// Failure surfaced as data on a result rather than thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Remediation advice for the user (where to get a key, accept terms).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl AnalysisError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provider, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            status: None,
            hint: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    /// Confidence in [0, 1].
    pub score: f64,
}

impl Tag {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Nudity-style safety metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SafetyScores {
    pub safe: f64,
    pub raw: f64,
    pub partial: f64,
}

/// Canonical per-provider analysis record.
///
/// When `error` is set the remaining fields hold defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub provider_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "isAIGenerated")]
    pub is_ai_generated: Option<bool>,
    pub ai_confidence: Option<f64>,
    pub description: String,
    pub full_analysis_text: String,
    pub tags: Vec<Tag>,
    pub key_elements: Vec<String>,
    pub safety: Option<SafetyScores>,
    pub offensive_probability: Option<f64>,
    pub error: Option<AnalysisError>,
}

impl AnalysisResult {
    /// Empty result for a provider; normalisers fill in what they know.
    pub fn empty(provider: ProviderId) -> Self {
        Self {
            provider_name: provider.as_str().to_string(),
            model: None,
            is_ai_generated: None,
            ai_confidence: None,
            description: String::new(),
            full_analysis_text: String::new(),
            tags: Vec::new(),
            key_elements: Vec::new(),
            safety: None,
            offensive_probability: None,
            error: None,
        }
    }

    pub fn failed(provider: ProviderId, error: AnalysisError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(provider)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Output of one `analyze_image` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub request_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub results: BTreeMap<ProviderId, AnalysisResult>,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> Vec<ProviderId> {
        self.results
            .iter()
            .filter(|(_, r)| !r.is_error())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn failed(&self) -> Vec<ProviderId> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_error())
            .map(|(id, _)| *id)
            .collect()
    }
}
