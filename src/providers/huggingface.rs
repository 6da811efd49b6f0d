//! Secondary recognition provider backed by hosted image-classification models.
//!
//! Each model is tried with a binary body first and a base64 JSON body second.
//! A 503 means the model is still loading: the client waits (honouring a
//! capped `retry-after`) and tries the same model again a bounded number of
//! times. HTML error pages and auth failures move on to the next model.

use super::fallback::{Attempt, FallbackChain};
use super::http::{truncate, RawResponse};
use super::{missing_credentials, ImageAnalyzer, ProviderOutcome};
use crate::config::{AnalysisPolicy, HuggingFaceConfig};
use crate::image::ImageInput;
use crate::models::{AnalysisError, ProviderId};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const KEY_HINT: &str = "Create a token at https://huggingface.co/settings/tokens and set HF_API_KEY=hf_...";
const TROUBLESHOOT_HINT: &str = "Check that HF_API_KEY starts with 'hf_', that 'Make calls to Inference Providers' is enabled for the token, and that the models are available for hosted inference (https://status.huggingface.co/)";

pub struct HuggingFaceClient {
    http: Client,
    config: HuggingFaceConfig,
    policy: AnalysisPolicy,
}

impl HuggingFaceClient {
    pub fn new(config: HuggingFaceConfig, policy: AnalysisPolicy, http: Client) -> Self {
        Self {
            http,
            config,
            policy,
        }
    }

    async fn post_binary(&self, url: &str, api_key: &str, image: &ImageInput) -> Result<RawResponse> {
        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .header(reqwest::header::CONTENT_TYPE, image.mime().as_str())
            .body(image.bytes().to_vec())
            .send()
            .await?;
        RawResponse::read(response).await
    }

    async fn post_base64(&self, url: &str, api_key: &str, image: &ImageInput) -> Result<RawResponse> {
        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&json!({ "inputs": image.base64() }))
            .send()
            .await?;
        RawResponse::read(response).await
    }

    /// One request round against a model: binary, then JSON, then legacy endpoint.
    async fn request_model(
        &self,
        api_key: &str,
        model: &str,
        image: &ImageInput,
    ) -> Result<RawResponse> {
        let url = format!("{}/models/{}", self.config.base_url, model);
        let mut response = self.post_binary(&url, api_key, image).await?;

        if !response.is_success() && response.status != 503 {
            match self.post_base64(&url, api_key, image).await {
                Ok(json_response) => response = json_response,
                Err(e) => tracing::warn!(model, "Base64 request failed: {}", e),
            }
        }

        if matches!(response.status, 404 | 410) && !response.is_html() {
            if let Some(legacy_base) = &self.config.legacy_base_url {
                let legacy_url = format!("{}/models/{}", legacy_base, model);
                tracing::debug!(model, status = response.status, "Trying legacy inference endpoint");
                match self.post_binary(&legacy_url, api_key, image).await {
                    Ok(legacy_response) => response = legacy_response,
                    Err(e) => tracing::warn!(model, "Legacy endpoint request failed: {}", e),
                }
            }
        }

        Ok(response)
    }

    async fn try_model(&self, api_key: &str, model: &str, image: &ImageInput) -> Attempt<Value> {
        let mut loading_retries = 0;

        loop {
            let response = match self.request_model(api_key, model, image).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(model, "HuggingFace request failed: {}", e);
                    return Attempt::Advance(AnalysisError::provider(e.to_string()));
                }
            };

            if response.is_html() {
                let message = embedded_error(&response.body)
                    .unwrap_or_else(|| "Received HTML error page - endpoint may be deprecated".to_string());
                tracing::warn!(model, status = response.status, "HTML response: {}", message);
                return Attempt::Advance(AnalysisError::provider(message).with_status(response.status));
            }

            if response.is_success() {
                return match response.json() {
                    Some(value) if value.get("error").is_some() => Attempt::Advance(
                        AnalysisError::provider(response.error_summary()).with_status(response.status),
                    ),
                    Some(value @ (Value::Array(_) | Value::Object(_))) => Attempt::Success(value),
                    _ => Attempt::Advance(
                        AnalysisError::provider("Unparseable HuggingFace response")
                            .with_status(response.status)
                            .with_details(truncate(&response.body, 200)),
                    ),
                };
            }

            if response.status == 503 && loading_retries < self.policy.max_loading_retries {
                loading_retries += 1;
                let wait = response
                    .retry_after
                    .unwrap_or(self.policy.model_loading_wait)
                    .min(self.policy.model_loading_wait_cap);
                tracing::info!(model, "Model is loading, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            if matches!(response.status, 401 | 403) {
                return Attempt::Advance(
                    AnalysisError::provider(format!("Authentication issue for {}", model))
                        .with_status(response.status)
                        .with_hint(format!(
                            "Visit https://huggingface.co/{} and accept the model terms if required",
                            model
                        )),
                );
            }

            return Attempt::Advance(
                AnalysisError::provider(response.error_summary()).with_status(response.status),
            );
        }
    }
}

/// `{"error": "..."}` fragments that some gateways embed in HTML pages.
fn embedded_error(body: &str) -> Option<String> {
    let start = body.find("{\"error\"")?;
    let end = start + body[start..].find('}')?;
    let value: Value = serde_json::from_str(&body[start..=end]).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

#[async_trait]
impl ImageAnalyzer for HuggingFaceClient {
    fn id(&self) -> ProviderId {
        ProviderId::HuggingFace
    }

    async fn analyze(&self, image: &ImageInput) -> ProviderOutcome {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return missing_credentials(ProviderId::HuggingFace, "API key", KEY_HINT);
        };

        let result = FallbackChain::new(self.config.models.clone())
            .run("huggingface", |model| async move {
                self.try_model(api_key, &model, image).await
            })
            .await;

        match result {
            Ok((model, raw)) => {
                tracing::info!(model = %model, "HuggingFace classification succeeded");
                ProviderOutcome::success(raw, model)
            }
            Err(exhausted) => {
                tracing::error!(
                    tried = ?exhausted.tried,
                    "HuggingFace API: all models unavailable: {}",
                    exhausted.describe()
                );
                let hint = exhausted
                    .last_error
                    .as_ref()
                    .and_then(|(_, e)| e.hint.clone())
                    .unwrap_or_else(|| TROUBLESHOOT_HINT.to_string());
                let mut error = AnalysisError::provider("HuggingFace API: All models unavailable")
                    .with_details(exhausted.describe())
                    .with_hint(hint);
                error.status = exhausted.last_status();
                ProviderOutcome::Failure(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer, models: &[&str], legacy: bool) -> HuggingFaceClient {
        make_client_with_policy(server, models, legacy, AnalysisPolicy::immediate())
    }

    fn make_client_with_policy(
        server: &MockServer,
        models: &[&str],
        legacy: bool,
        policy: AnalysisPolicy,
    ) -> HuggingFaceClient {
        let config = HuggingFaceConfig {
            api_key: Some("hf_token".to_string()),
            models: models.iter().map(|m| m.to_string()).collect(),
            base_url: server.uri(),
            legacy_base_url: legacy.then(|| format!("{}/legacy", server.uri())),
        };
        HuggingFaceClient::new(config, policy, Client::new())
    }

    async fn mount_loading_then_labels(server: &MockServer, loading: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/models/org/m"))
            .respond_with(loading)
            .up_to_n_times(1)
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/org/m"))
            .respond_with(labels())
            .expect(1)
            .mount(server)
            .await;
    }

    fn image() -> ImageInput {
        ImageInput::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png").unwrap()
    }

    fn labels() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "label": "tabby cat", "score": 0.91 },
            { "label": "tiger cat", "score": 0.05 }
        ]))
    }

    #[tokio::test]
    async fn test_html_model_skipped_and_loading_model_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/org/first"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<!DOCTYPE html><html>Gone</html>"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/org/second"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("retry-after", "0")
                    .set_body_json(serde_json::json!({ "error": "Model is loading" })),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/org/second"))
            .respond_with(labels())
            .expect(1)
            .mount(&server)
            .await;

        let outcome = make_client(&server, &["org/first", "org/second"], false)
            .analyze(&image())
            .await;
        match outcome {
            ProviderOutcome::Success { model, raw } => {
                assert_eq!(model, "org/second");
                assert_eq!(raw[0]["label"], "tabby cat");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_loading_wait_is_capped_despite_long_retry_after() {
        let server = MockServer::start().await;
        mount_loading_then_labels(
            &server,
            ResponseTemplate::new(503)
                .insert_header("retry-after", "3600")
                .set_body_json(serde_json::json!({ "error": "Model is loading" })),
        )
        .await;

        let policy = AnalysisPolicy {
            model_loading_wait: Duration::from_secs(10),
            model_loading_wait_cap: Duration::from_millis(50),
            ..AnalysisPolicy::immediate()
        };
        let client = make_client_with_policy(&server, &["org/m"], false, policy);

        let started = Instant::now();
        let outcome = tokio::time::timeout(Duration::from_secs(5), client.analyze(&image()))
            .await
            .expect("loading wait should be capped");
        let elapsed = started.elapsed();

        assert!(outcome.is_success());
        assert!(elapsed >= Duration::from_millis(50), "waited only {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_loading_wait_defaults_without_retry_after() {
        let server = MockServer::start().await;
        mount_loading_then_labels(
            &server,
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({ "error": "Model is loading" })),
        )
        .await;

        let policy = AnalysisPolicy {
            model_loading_wait: Duration::from_millis(40),
            model_loading_wait_cap: Duration::from_secs(10),
            ..AnalysisPolicy::immediate()
        };
        let client = make_client_with_policy(&server, &["org/m"], false, policy);

        let started = Instant::now();
        let outcome = client.analyze(&image()).await;
        let elapsed = started.elapsed();

        assert!(outcome.is_success());
        assert!(elapsed >= Duration::from_millis(40), "waited only {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_base64_json_used_when_binary_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/org/m"))
            .and(header("content-type", "image/png"))
            .and(header("authorization", "Bearer hf_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "Unsupported content"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/org/m"))
            .and(header("content-type", "application/json"))
            .respond_with(labels())
            .expect(1)
            .mount(&server)
            .await;

        let outcome = make_client(&server, &["org/m"], false).analyze(&image()).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_legacy_endpoint_tried_after_router_404() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/org/m"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "Not Found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/legacy/models/org/m"))
            .respond_with(labels())
            .expect(1)
            .mount(&server)
            .await;

        let outcome = make_client(&server, &["org/m"], true).analyze(&image()).await;
        match outcome {
            ProviderOutcome::Success { model, .. } => assert_eq!(model, "org/m"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_failures_exhaust_with_terms_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let outcome = make_client(&server, &["org/a", "org/b"], false)
            .analyze(&image())
            .await;
        match outcome {
            ProviderOutcome::Failure(err) => {
                assert_eq!(err.kind, ErrorKind::Provider);
                assert_eq!(err.message, "HuggingFace API: All models unavailable");
                assert_eq!(err.status, Some(403));
                assert_eq!(
                    err.details.as_deref(),
                    Some("Last error from org/b: Authentication issue for org/b")
                );
                assert!(err.hint.unwrap().contains("https://huggingface.co/org/b"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persistent_loading_gives_up_after_bounded_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let outcome = make_client(&server, &["org/slow"], false)
            .analyze(&image())
            .await;
        match outcome {
            ProviderOutcome::Failure(err) => assert_eq!(err.status, Some(503)),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_object_with_ok_status_advances() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/org/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "Model org/broken is currently unavailable"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/org/fine"))
            .respond_with(labels())
            .mount(&server)
            .await;

        let outcome = make_client(&server, &["org/broken", "org/fine"], false)
            .analyze(&image())
            .await;
        match outcome {
            ProviderOutcome::Success { model, .. } => assert_eq!(model, "org/fine"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_embedded_error_is_extracted_from_html() {
        let body = r#"<!doctype html><body>{"error": "Model not supported"}</body>"#;
        assert_eq!(embedded_error(body).as_deref(), Some("Model not supported"));
        assert_eq!(embedded_error("<html></html>"), None);
    }
}
