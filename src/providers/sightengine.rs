use super::http::{send_with_retry, RawResponse};
use super::{failure_from_error, missing_credentials, ImageAnalyzer, ProviderOutcome};
use crate::config::{AnalysisPolicy, SightengineConfig};
use crate::image::ImageInput;
use crate::models::{AnalysisError, ProviderId};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

const CREDENTIALS_HINT: &str =
    "Set SIGHTENGINE_USER and SIGHTENGINE_SECRET from https://dashboard.sightengine.com/";

/// Content-moderation client; one multipart call requesting every detection model.
pub struct SightengineClient {
    http: Client,
    config: SightengineConfig,
    policy: AnalysisPolicy,
}

impl SightengineClient {
    pub fn new(config: SightengineConfig, policy: AnalysisPolicy, http: Client) -> Self {
        Self {
            http,
            config,
            policy,
        }
    }

    fn form(image: &ImageInput) -> reqwest::Result<Form> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name())
            .mime_str(image.mime().as_str())?;
        Ok(Form::new().part("media", part))
    }

    /// A 2xx body can still report an API-level failure.
    fn body_error(raw: &Value) -> Option<String> {
        let failed = raw.get("status").and_then(Value::as_str) == Some("failure");
        let error = raw.get("error").filter(|e| !e.is_null());
        if !failed && error.is_none() {
            return None;
        }
        let message = error
            .and_then(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .or_else(|| e.as_str())
            })
            .or_else(|| raw.get("message").and_then(Value::as_str))
            .unwrap_or("Sightengine API returned an error");
        Some(message.to_string())
    }

    fn interpret(response: RawResponse) -> ProviderOutcome {
        if !response.is_success() {
            tracing::error!(
                status = response.status,
                "Sightengine API error: {}",
                response.body
            );
            return ProviderOutcome::Failure(
                AnalysisError::provider(format!("Sightengine API error: {}", response.status))
                    .with_status(response.status)
                    .with_details(response.error_summary()),
            );
        }

        let raw = response.payload();
        if let Some(message) = Self::body_error(&raw) {
            tracing::error!("Sightengine API error in response: {}", message);
            return ProviderOutcome::Failure(
                AnalysisError::provider(message)
                    .with_status(response.status)
                    .with_details(response.body),
            );
        }

        tracing::debug!(
            keys = ?raw.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()),
            "Sightengine response received"
        );
        ProviderOutcome::success(raw, "sightengine")
    }
}

#[async_trait]
impl ImageAnalyzer for SightengineClient {
    fn id(&self) -> ProviderId {
        ProviderId::Sightengine
    }

    async fn analyze(&self, image: &ImageInput) -> ProviderOutcome {
        let (Some(api_user), Some(api_secret)) = (
            self.config.api_user.as_deref(),
            self.config.api_secret.as_deref(),
        ) else {
            return missing_credentials(ProviderId::Sightengine, "API credentials", CREDENTIALS_HINT);
        };

        let url = format!("{}/1.0/check.json", self.config.base_url);
        let query = [
            ("models", self.config.models.as_str()),
            ("api_user", api_user),
            ("api_secret", api_secret),
        ];

        let response = send_with_retry(&self.policy, "sightengine", || {
            let request = self.http.post(&url).query(&query);
            let form = Self::form(image);
            async move { request.multipart(form?).send().await }
        })
        .await;

        match response {
            Ok(response) => Self::interpret(response),
            Err(e) => {
                tracing::error!("Sightengine request failed: {}", e);
                ProviderOutcome::Failure(failure_from_error(ProviderId::Sightengine, e))
            }
        }
    }
}
