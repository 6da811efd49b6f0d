//! Startup configuration
//!
//! Credentials and policy knobs are read once, at startup, into explicit
//! structs that are handed to each provider client. Request-handling code
//! never looks at the process environment.

use crate::{Error, Result};
use std::time::Duration;

/// Sightengine scores above this are classified as AI-generated.
pub const AI_GENERATED_THRESHOLD: f64 = 0.3;
/// Pause after a Gemini 429 before moving to the next model.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);
/// Wait used for a HuggingFace 503 without a `retry-after` header.
pub const MODEL_LOADING_WAIT: Duration = Duration::from_secs(15);
/// Upper bound for any `retry-after` hint.
pub const MODEL_LOADING_WAIT_CAP: Duration = Duration::from_secs(30);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const SIGHTENGINE_BASE_URL: &str = "https://api.sightengine.com";
pub const CLARIFAI_BASE_URL: &str = "https://api.clarifai.com";
pub const HUGGINGFACE_BASE_URL: &str = "https://router.huggingface.co";
pub const HUGGINGFACE_LEGACY_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Gemini models tried when live discovery yields nothing usable.
pub const GEMINI_FALLBACK_MODELS: [&str; 6] = [
    "gemini-2.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-pro",
];

pub const SIGHTENGINE_MODELS: &str = "nudity-2.1,weapon,alcohol,recreational_drug,medical,properties,type,quality,offensive-2.0,faces,people-counting,text-content,face-age,gore-2.0,text,qr-content,tobacco,genai,violence,self-harm,money,gambling";

pub const CLARIFAI_MODEL: &str = "general-image-recognition";

pub const HUGGINGFACE_MODELS: [&str; 3] = [
    "microsoft/resnet-50",
    "google/vit-base-patch16-224",
    "facebook/deit-base-distilled-patch16-224",
];

/// Thresholds, waits and retry bounds shared by clients and normaliser.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPolicy {
    pub ai_generated_threshold: f64,
    pub rate_limit_backoff: Duration,
    pub model_loading_wait: Duration,
    pub model_loading_wait_cap: Duration,
    /// 503 "model loading" retries per HuggingFace model.
    pub max_loading_retries: u32,
    pub request_timeout: Duration,
    /// Extra attempts for single-endpoint providers on 429/503/network errors.
    pub transient_retries: usize,
    pub transient_retry_interval: Duration,
    /// Deadline for one provider call, including all of its fallbacks.
    pub provider_deadline: Option<Duration>,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        Self {
            ai_generated_threshold: AI_GENERATED_THRESHOLD,
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
            model_loading_wait: MODEL_LOADING_WAIT,
            model_loading_wait_cap: MODEL_LOADING_WAIT_CAP,
            max_loading_retries: 1,
            request_timeout: REQUEST_TIMEOUT,
            transient_retries: 2,
            transient_retry_interval: Duration::from_secs(1),
            provider_deadline: None,
        }
    }
}

impl AnalysisPolicy {
    /// Policy with every wait shortened, for tests against mock servers.
    pub fn immediate() -> Self {
        Self {
            rate_limit_backoff: Duration::ZERO,
            model_loading_wait: Duration::ZERO,
            transient_retry_interval: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub fallback_models: Vec<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: GEMINI_BASE_URL.to_string(),
            fallback_models: GEMINI_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SightengineConfig {
    pub api_user: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: String,
    pub models: String,
}

impl Default for SightengineConfig {
    fn default() -> Self {
        Self {
            api_user: None,
            api_secret: None,
            base_url: SIGHTENGINE_BASE_URL.to_string(),
            models: SIGHTENGINE_MODELS.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClarifaiConfig {
    pub api_key: Option<String>,
    pub user_id: String,
    pub app_id: String,
    pub model: String,
    pub base_url: String,
}

impl Default for ClarifaiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            user_id: "clarifai".to_string(),
            app_id: "main".to_string(),
            model: CLARIFAI_MODEL.to_string(),
            base_url: CLARIFAI_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub api_key: Option<String>,
    pub models: Vec<String>,
    pub base_url: String,
    /// Older inference endpoint tried after a router 404/410.
    pub legacy_base_url: Option<String>,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            models: HUGGINGFACE_MODELS.iter().map(|m| m.to_string()).collect(),
            base_url: HUGGINGFACE_BASE_URL.to_string(),
            legacy_base_url: Some(HUGGINGFACE_LEGACY_BASE_URL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub sightengine: SightengineConfig,
    pub clarifai: ClarifaiConfig,
    pub huggingface: HuggingFaceConfig,
    pub policy: AnalysisPolicy,
}

impl Config {
    /// Load `.env` (if present) and read configuration from the environment.
    ///
    /// Missing credentials are not an error here; the affected provider
    /// reports a configuration failure when it is asked to analyse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config::default();

        config.gemini.api_key = get("GEMINI_API_KEY");

        config.sightengine.api_user = get("SIGHTENGINE_USER");
        config.sightengine.api_secret = get("SIGHTENGINE_SECRET");

        config.clarifai.api_key = get("CLARIFAI_API_KEY");
        if let Some(user_id) = get("CLARIFAI_USER_ID") {
            config.clarifai.user_id = user_id;
        }
        if let Some(app_id) = get("CLARIFAI_APP_ID") {
            config.clarifai.app_id = app_id;
        }

        config.huggingface.api_key = get("HF_API_KEY");

        if let Some(raw) = get("IMAGE_INSIGHT_AI_THRESHOLD") {
            let threshold: f64 = raw.parse().map_err(|_| {
                Error::Config(format!("IMAGE_INSIGHT_AI_THRESHOLD is not a number: {}", raw))
            })?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::Config(format!(
                    "IMAGE_INSIGHT_AI_THRESHOLD must be within 0.0..=1.0, got {}",
                    threshold
                )));
            }
            config.policy.ai_generated_threshold = threshold;
        }

        if let Some(raw) = get("IMAGE_INSIGHT_PROVIDER_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                Error::Config(format!(
                    "IMAGE_INSIGHT_PROVIDER_TIMEOUT_SECS is not a whole number: {}",
                    raw
                ))
            })?;
            if secs == 0 {
                return Err(Error::Config(
                    "IMAGE_INSIGHT_PROVIDER_TIMEOUT_SECS must be at least 1".to_string(),
                ));
            }
            config.policy.provider_deadline = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}
