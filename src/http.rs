//! HTTP client abstraction for service notifications.
//!
//! This module defines the `HttpClient` trait to abstract HTTP request
//! execution, enabling testability with mock implementations. The notifier
//! only ever POSTs a JSON body, so that is the whole surface.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

/// Trait for executing notification requests.
///
/// This abstraction allows for different implementations (production vs.
/// testing) and makes dispatch logic testable without real HTTP calls.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// POST a JSON body to `url`.
    ///
    /// # Errors
    /// Returns an error if the request fails due to network issues, times
    /// out, or the URL is invalid. A response with a non-2xx status is NOT
    /// an error at this layer; classification happens in the notifier.
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, body))]
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        tracing::debug!(url = %url, timeout_ms, "Executing notification POST");

        let response = self
            .client
            .post(url)
            .timeout(Duration::from_millis(timeout_ms))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Notification POST failed");
                e
            })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::info!(
            url = %url,
            status,
            response_len = body.len(),
            "Notification POST completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses per URL without making actual
/// HTTP calls. Multiple responses for the same URL are returned in FIFO
/// order.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<HttpResponse>>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub body: serde_json::Value,
    pub timeout_ms: u64,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predetermined response for a URL.
    pub fn add_response(&self, url: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(url.to_string())
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the calls made to one URL.
    pub fn calls_for(&self, url: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        self.calls.lock().push(MockCall {
            url: url.to_string(),
            body: body.clone(),
            timeout_ms,
        });

        let response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(url) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match response {
            Some(response) => response,
            None => Err(crate::error::ExpungeError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_basic() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "https://svc.example.com/anonymize",
            Ok(HttpResponse {
                status: 200,
                body: "ok".to_string(),
            }),
        );

        let body = serde_json::json!({"user": "u@example.com"});
        let response = mock
            .post_json("https://svc.example.com/anonymize", &body, 60_000)
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://svc.example.com/anonymize");
        assert_eq!(calls[0].timeout_ms, 60_000);
        assert_eq!(calls[0].body, body);
    }

    #[tokio::test]
    async fn test_mock_client_fifo_responses() {
        let mock = MockHttpClient::new();
        for body in ["first", "second"] {
            mock.add_response(
                "https://svc.example.com/anonymize",
                Ok(HttpResponse {
                    status: 200,
                    body: body.to_string(),
                }),
            );
        }

        let body = serde_json::json!({});
        let first = mock
            .post_json("https://svc.example.com/anonymize", &body, 1000)
            .await
            .unwrap();
        let second = mock
            .post_json("https://svc.example.com/anonymize", &body, 1000)
            .await
            .unwrap();
        assert_eq!(first.body, "first");
        assert_eq!(second.body, "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_client_unconfigured_url_errors() {
        let mock = MockHttpClient::new();
        let result = mock
            .post_json("https://unknown.example.com/x", &serde_json::json!({}), 1000)
            .await;
        assert!(result.is_err());
    }
}
