//! HTTP plumbing shared by the provider clients.

use crate::config::AnalysisPolicy;
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

const ERROR_SNIPPET_CHARS: usize = 200;

/// A fully read provider response.
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: String,
    /// `retry-after` header in whole seconds, when present.
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await?;

        Ok(Self {
            status,
            body,
            retry_after,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error pages served instead of an API response.
    pub fn is_html(&self) -> bool {
        let head: String = self.body.trim_start().chars().take(15).collect();
        let head = head.to_ascii_lowercase();
        head.starts_with("<!doctype") || head.starts_with("<html")
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Body as JSON, or as a JSON string when it is not JSON at all.
    pub fn payload(&self) -> Value {
        self.json().unwrap_or_else(|| Value::String(self.body.clone()))
    }

    pub fn error_summary(&self) -> String {
        summarize_error_body(&self.body)
    }
}

/// Pull the most useful message out of an error body.
pub(crate) fn summarize_error_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json
            .pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| json.get("error").and_then(Value::as_str))
            .or_else(|| json.get("message").and_then(Value::as_str));
        if let Some(message) = message {
            return message.to_string();
        }
    }
    truncate(body.trim(), ERROR_SNIPPET_CHARS)
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Send a request, retrying network failures and 429/503 responses.
///
/// `send` is called once per attempt so request bodies can be rebuilt.
/// Other statuses are returned as-is for the caller to interpret. When
/// retries run out on a 429/503 the result is `Error::UnexpectedStatus`.
pub(crate) async fn send_with_retry<F, Fut>(
    policy: &AnalysisPolicy,
    label: &str,
    mut send: F,
) -> Result<RawResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<reqwest::Response>>,
{
    let strategy =
        FixedInterval::new(policy.transient_retry_interval).take(policy.transient_retries);

    RetryIf::start(
        strategy,
        || {
            let request = send();
            async move {
                let response = RawResponse::read(request.await?).await?;
                if matches!(response.status, 429 | 503) {
                    return Err(Error::UnexpectedStatus {
                        status: response.status,
                        body: response.body,
                    });
                }
                Ok(response)
            }
        },
        |e: &Error| {
            let transient = e.is_transient();
            if transient {
                tracing::warn!(provider = label, error = %e, "Transient failure, retrying");
            }
            transient
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn test_summary_prefers_nested_error_message() {
        let body = r#"{"error": {"code": 404, "message": "models/foo is not found"}}"#;
        assert_eq!(summarize_error_body(body), "models/foo is not found");
    }

    #[test]
    fn test_summary_accepts_flat_error_and_message() {
        assert_eq!(summarize_error_body(r#"{"error": "Model is loading"}"#), "Model is loading");
        assert_eq!(summarize_error_body(r#"{"message": "quota"}"#), "quota");
    }

    #[test]
    fn test_summary_truncates_plain_text() {
        let body = "x".repeat(500);
        assert_eq!(summarize_error_body(&body).len(), 200);
    }

    #[test]
    fn test_html_detection_is_case_insensitive() {
        assert!(response(200, "  <!DOCTYPE html><html>").is_html());
        assert!(response(404, "<!doctype html>").is_html());
        assert!(response(500, "<html><body>err</body></html>").is_html());
        assert!(!response(200, r#"[{"label": "cat"}]"#).is_html());
    }

    #[test]
    fn test_payload_wraps_non_json_as_string() {
        assert_eq!(response(200, "not json").payload(), Value::String("not json".into()));
        assert_eq!(response(200, r#"{"a": 1}"#).payload()["a"], 1);
    }

    #[tokio::test]
    async fn test_send_with_retry_recovers_from_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let uri = server.uri();
        let response = send_with_retry(&AnalysisPolicy::immediate(), "test", || {
            client.get(&uri).send()
        })
        .await
        .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");
    }

    #[tokio::test]
    async fn test_send_with_retry_gives_up_after_bound() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let uri = server.uri();
        let err = send_with_retry(&AnalysisPolicy::immediate(), "test", || {
            client.get(&uri).send()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::UnexpectedStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_send_with_retry_returns_client_errors_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let uri = server.uri();
        let response = send_with_retry(&AnalysisPolicy::immediate(), "test", || {
            client.get(&uri).send()
        })
        .await
        .unwrap();

        assert_eq!(response.status, 401);
    }
}
