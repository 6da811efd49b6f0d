use super::fallback::{Attempt, FallbackChain};
use super::http::RawResponse;
use super::{missing_credentials, ImageAnalyzer, ProviderOutcome};
use crate::config::{AnalysisPolicy, GeminiConfig};
use crate::image::ImageInput;
use crate::models::{AnalysisError, ProviderId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const API_VERSION: &str = "v1beta";

const KEY_HINT: &str = "Get a free API key at https://aistudio.google.com/ and set GEMINI_API_KEY";
const INVALID_KEY_HINT: &str = "The Gemini API rejected the key. Create a new key at https://aistudio.google.com/, update GEMINI_API_KEY without quotes or spaces, and restart";
const TROUBLESHOOT_HINT: &str = "Check GEMINI_API_KEY, the free-tier limit (60 requests/minute), and that the image is JPEG, PNG, WebP or GIF";

pub const ANALYSIS_PROMPT: &str = r#"Analyze this image thoroughly and answer with a single JSON object using exactly these fields:

{
  "description": "a clear 2-3 sentence summary of the image",
  "isAI": true or false, whether the image appears to be AI-generated,
  "aiConfidence": a number from 0.0 to 1.0 expressing confidence in the isAI verdict,
  "keyElements": ["the main objects or features"],
  "fullAnalysis": "a detailed, readable paragraph covering everything visible: objects, people, any text, content type (photo, illustration, graphic), lighting, composition, colours, setting, quality and anything notable or concerning"
}

When judging whether the image is AI-generated, look for unnatural patterns or artifacts, implausible symmetry or detail, inconsistent textures or lighting, and odd blending along edges.

Respond with the JSON object only, without markdown code fences."#;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

/// Variant order matters for `#[serde(untagged)]`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// What the `models` listing told us before analysis started.
#[derive(Debug, Default)]
struct Discovery {
    models: Vec<String>,
    key_rejected: bool,
}

/// First text part of the first candidate in a `generateContent` response.
pub(crate) fn candidate_text(raw: &Value) -> Option<String> {
    raw.pointer("/candidates/0/content/parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Generative-vision client that walks a list of model variants until one answers.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
    policy: AnalysisPolicy,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, policy: AnalysisPolicy, http: Client) -> Self {
        Self {
            http,
            config,
            policy,
        }
    }

    /// List models to confirm the key works and to prefer live flash/pro variants.
    ///
    /// Best-effort: any failure here falls back to the configured model list.
    async fn discover_models(&self, api_key: &str) -> Discovery {
        let url = format!("{}/{}/models", self.config.base_url, API_VERSION);
        let response = match self.http.get(&url).header("x-goog-api-key", api_key).send().await {
            Ok(response) => RawResponse::read(response).await,
            Err(e) => Err(e.into()),
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Could not fetch available Gemini models: {}", e);
                return Discovery::default();
            }
        };

        if !response.is_success() {
            let message = response.error_summary();
            let key_rejected = response.status == 400
                || message.contains("API key not valid")
                || message.contains("INVALID_ARGUMENT");
            tracing::warn!(
                status = response.status,
                key_rejected,
                "Gemini key check failed: {}",
                message
            );
            return Discovery {
                models: Vec::new(),
                key_rejected,
            };
        }

        let listing: ListModelsResponse = match serde_json::from_str(&response.body) {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Failed to parse Gemini model listing: {}", e);
                return Discovery::default();
            }
        };

        let models = listing
            .models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
            .map(|m| m.name.strip_prefix("models/").unwrap_or(&m.name).to_string())
            .filter(|name| name.contains("gemini") && (name.contains("flash") || name.contains("pro")))
            .collect();

        Discovery {
            models,
            key_rejected: false,
        }
    }

    async fn try_model(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Attempt<Value> {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.config.base_url, API_VERSION, model
        );

        let sent = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await;
        let response = match sent {
            Ok(response) => RawResponse::read(response).await,
            Err(e) => Err(e.into()),
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(model, "Gemini request failed: {}", e);
                return Attempt::Advance(AnalysisError::provider(e.to_string()));
            }
        };

        if !response.is_success() {
            let mut message = response.error_summary();
            if message.is_empty() {
                message = format!("Gemini API error: {}", response.status);
            }
            let error = AnalysisError::provider(message).with_status(response.status);

            match response.status {
                400 | 404 => tracing::debug!(model, status = response.status, "Gemini model unavailable"),
                429 => {
                    tracing::warn!(
                        model,
                        "Gemini rate limited, backing off {:?}",
                        self.policy.rate_limit_backoff
                    );
                    tokio::time::sleep(self.policy.rate_limit_backoff).await;
                }
                status => tracing::warn!(model, status, "Gemini API error: {}", error.message),
            }
            return Attempt::Advance(error);
        }

        let Some(raw) = response.json() else {
            return Attempt::Advance(
                AnalysisError::provider("Unparseable Gemini response body")
                    .with_status(response.status),
            );
        };

        if candidate_text(&raw).is_none() {
            return Attempt::Advance(AnalysisError::provider("No analysis text in response"));
        }

        Attempt::Success(raw)
    }
}

#[async_trait]
impl ImageAnalyzer for GeminiClient {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn analyze(&self, image: &ImageInput) -> ProviderOutcome {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return missing_credentials(ProviderId::Gemini, "API key", KEY_HINT);
        };

        let discovery = self.discover_models(api_key).await;
        let models = if discovery.models.is_empty() {
            self.config.fallback_models.clone()
        } else {
            tracing::debug!("Using {} live Gemini models", discovery.models.len());
            discovery.models
        };

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: ANALYSIS_PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime().as_str().to_string(),
                            data: image.base64(),
                        },
                    },
                ],
            }],
        };

        let result = FallbackChain::new(models)
            .run("gemini", |model| {
                let request = &request;
                async move { self.try_model(api_key, &model, request).await }
            })
            .await;

        match result {
            Ok((model, raw)) => {
                tracing::info!(model = %model, "Gemini analysis succeeded");
                ProviderOutcome::success(raw, format!("{}/{}", API_VERSION, model))
            }
            Err(exhausted) => {
                tracing::error!(
                    tried = exhausted.tried.len(),
                    "All Gemini models failed: {}",
                    exhausted.describe()
                );
                let hint = if discovery.key_rejected {
                    INVALID_KEY_HINT
                } else {
                    TROUBLESHOOT_HINT
                };
                let mut error = AnalysisError::provider("All Gemini models failed")
                    .with_details(exhausted.describe())
                    .with_hint(hint);
                error.status = exhausted.last_status();
                ProviderOutcome::Failure(error)
            }
        }
    }
}
