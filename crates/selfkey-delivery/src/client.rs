//! HTTP client for webhook delivery with configurable timeouts.
//!
//! Handles request construction, response processing, and error
//! categorization for the retry loop. Any HTTP response, success or not, is
//! an `Ok` here; `Err` means the request never completed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Maximum characters of a response body kept for the audit log.
pub const RESPONSE_BODY_AUDIT_LIMIT: usize = 1000;

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for the whole request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "SelfKey-Webhook/1.0".to_string(),
        }
    }
}

/// HTTP client optimized for webhook delivery.
///
/// Uses connection pooling so one event fanning out to many subscriptions
/// reuses connections where possible.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// One webhook request, ready to send.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Destination URL.
    pub url: String,
    /// Serialized payload body.
    pub body: String,
    /// Content-Type header value matching the payload format.
    pub content_type: String,
    /// Event name, sent as `X-Webhook-Event`.
    pub event: String,
    /// 1-based attempt number, sent as `X-Webhook-Attempt`.
    pub attempt_number: u32,
    /// Hex HMAC signature of the body, sent as `X-Webhook-Signature`.
    pub signature: Option<String>,
}

/// Outcome of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for audit storage.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the status was 2xx.
    pub is_success: bool,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// POSTs one webhook request.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Timeout` when the configured timeout is
    /// exceeded and `DeliveryError::Network` for connection failures. HTTP
    /// error statuses are not errors; the caller inspects `is_success`.
    pub async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_request",
            url = %request.url,
            event = %request.event,
            attempt = request.attempt_number
        );

        async move {
            let mut http_request = self
                .client
                .post(&request.url)
                .body(request.body.clone())
                .header("Content-Type", &request.content_type)
                .header("X-Webhook-Event", &request.event)
                .header("X-Webhook-Attempt", request.attempt_number.to_string());

            if let Some(signature) = &request.signature {
                http_request = http_request.header("X-Webhook-Signature", signature);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let status_code = response.status().as_u16();
            let is_success = response.status().is_success();

            let body = match response.text().await {
                Ok(text) => truncate_for_audit(&text),
                Err(e) => {
                    tracing::warn!("failed to read response body: {}", e);
                    String::new()
                },
            };

            let duration = start_time.elapsed();

            tracing::debug!(
                status = status_code,
                duration_ms = duration.as_millis(),
                "received response"
            );

            Ok(DeliveryResponse { status_code, body, duration, is_success })
        }
        .instrument(span)
        .await
    }
}

/// Keeps the first [`RESPONSE_BODY_AUDIT_LIMIT`] characters of a response
/// body for the audit log.
pub fn truncate_for_audit(body: &str) -> String {
    body.chars().take(RESPONSE_BODY_AUDIT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn create_test_request(url: String) -> DeliveryRequest {
        DeliveryRequest {
            url,
            body: r#"{"event":"booking.created"}"#.to_string(),
            content_type: "application/json".to_string(),
            event: "booking.created".to_string(),
            attempt_number: 1,
            signature: None,
        }
    }

    #[tokio::test]
    async fn successful_delivery() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/webhook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/webhook", mock_server.uri()));

        let response = client.deliver(&request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.is_success);
        assert_eq!(response.body, "OK");
    }

    #[tokio::test]
    async fn http_errors_are_not_transport_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/webhook", mock_server.uri()));

        let response = client.deliver(&request).await.unwrap();
        assert_eq!(response.status_code, 404);
        assert!(!response.is_success);
        assert_eq!(response.body, "Not Found");
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let client = DeliveryClient::with_defaults().unwrap();
        // Port 1 is never listening
        let request = create_test_request("http://127.0.0.1:1/webhook".to_string());

        let err = client.deliver(&request).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn protocol_headers_are_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::header("X-Webhook-Event", "booking.created"))
            .and(matchers::header("X-Webhook-Attempt", "2"))
            .and(matchers::header("X-Webhook-Signature", "abc123"))
            .and(matchers::header("User-Agent", "SelfKey-Webhook/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let mut request = create_test_request(format!("{}/webhook", mock_server.uri()));
        request.attempt_number = 2;
        request.signature = Some("abc123".to_string());

        let response = client.deliver(&request).await.unwrap();
        assert!(response.is_success);
    }

    #[test]
    fn audit_truncation_keeps_first_1000_chars() {
        let long = "x".repeat(5000);
        let truncated = truncate_for_audit(&long);
        assert_eq!(truncated.len(), RESPONSE_BODY_AUDIT_LIMIT);

        let short = "hello";
        assert_eq!(truncate_for_audit(short), "hello");
    }
}
