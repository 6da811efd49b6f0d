use super::http::{send_with_retry, RawResponse};
use super::{failure_from_error, missing_credentials, ImageAnalyzer, ProviderOutcome};
use crate::config::{AnalysisPolicy, ClarifaiConfig};
use crate::image::ImageInput;
use crate::models::{AnalysisError, ProviderId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

const KEY_HINT: &str = "Set CLARIFAI_API_KEY to a personal access token from https://clarifai.com/settings/security";

/// Clarifai reports success inside the body with this status code.
const STATUS_SUCCESS: i64 = 10000;

#[derive(Debug, Serialize)]
struct OutputsRequest {
    inputs: Vec<Input>,
}

#[derive(Debug, Serialize)]
struct Input {
    data: InputData,
}

#[derive(Debug, Serialize)]
struct InputData {
    image: ImagePayload,
}

#[derive(Debug, Serialize)]
struct ImagePayload {
    base64: String,
}

/// Recognition client returning labelled concepts for a fixed general model.
pub struct ClarifaiClient {
    http: Client,
    config: ClarifaiConfig,
    policy: AnalysisPolicy,
}

impl ClarifaiClient {
    pub fn new(config: ClarifaiConfig, policy: AnalysisPolicy, http: Client) -> Self {
        Self {
            http,
            config,
            policy,
        }
    }

    fn outputs_url(&self) -> String {
        format!(
            "{}/v2/users/{}/apps/{}/models/{}/outputs",
            self.config.base_url, self.config.user_id, self.config.app_id, self.config.model
        )
    }

    fn interpret(&self, response: RawResponse) -> ProviderOutcome {
        if !response.is_success() {
            tracing::error!(
                status = response.status,
                "Clarifai API error: {}",
                response.body
            );
            return ProviderOutcome::Failure(
                AnalysisError::provider(format!("Clarifai API error: {}", response.status))
                    .with_status(response.status)
                    .with_details(response.error_summary()),
            );
        }

        let raw = response.payload();
        if let Some(code) = raw.pointer("/status/code").and_then(Value::as_i64) {
            if code != STATUS_SUCCESS {
                let description = raw
                    .pointer("/status/description")
                    .and_then(Value::as_str)
                    .unwrap_or("Clarifai returned an error status")
                    .to_string();
                tracing::error!(code, "Clarifai status error: {}", description);
                return ProviderOutcome::Failure(
                    AnalysisError::provider(description)
                        .with_status(response.status)
                        .with_details(format!("Clarifai status code {}", code)),
                );
            }
        }

        ProviderOutcome::success(raw, self.config.model.clone())
    }
}

#[async_trait]
impl ImageAnalyzer for ClarifaiClient {
    fn id(&self) -> ProviderId {
        ProviderId::Clarifai
    }

    async fn analyze(&self, image: &ImageInput) -> ProviderOutcome {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return missing_credentials(ProviderId::Clarifai, "API key", KEY_HINT);
        };

        let url = self.outputs_url();
        let request = OutputsRequest {
            inputs: vec![Input {
                data: InputData {
                    image: ImagePayload {
                        base64: image.base64(),
                    },
                },
            }],
        };

        let response = send_with_retry(&self.policy, "clarifai", || {
            self.http
                .post(&url)
                .header("Authorization", format!("Key {}", api_key))
                .json(&request)
                .send()
        })
        .await;

        match response {
            Ok(response) => self.interpret(response),
            Err(e) => {
                tracing::error!("Clarifai request failed: {}", e);
                ProviderOutcome::Failure(failure_from_error(ProviderId::Clarifai, e))
            }
        }
    }
}
