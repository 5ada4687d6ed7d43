//! Shared HTTP transport with bounded retry.
//!
//! Every outbound call from both service clients goes through one send
//! path: transient failures (network errors, timeouts, and the retryable
//! status set 429/500/502/503/504) are retried with exponential backoff up
//! to a fixed attempt budget; everything else is surfaced immediately.

use crate::models::{FlowgateError, Result, RETRYABLE_STATUSES};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper shared by the MinRUE and RAGFlow clients.
pub struct HttpClient {
    client: reqwest::Client,
    /// Name of this endpoint (for logging)
    name: String,
    /// API key (None for local endpoints without auth)
    api_key: Option<String>,
    /// Base URL for the API
    base_url: String,
    /// Custom headers to include in requests
    custom_headers: HashMap<String, String>,
    /// Request timeout
    timeout: Duration,
    /// Maximum attempts per logical request
    max_retries: u32,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// # Arguments
    /// - `name`: Endpoint name for logging (e.g., "minrue", "ragflow")
    /// - `api_key`: Optional bearer token (None for local endpoints)
    /// - `base_url`: Base URL for the API
    /// - `custom_headers`: Additional headers to include in requests
    /// - `timeout_secs`: Request timeout in seconds
    /// - `max_retries`: Maximum attempts per logical request
    pub fn new(
        name: String,
        api_key: Option<String>,
        base_url: String,
        custom_headers: HashMap<String, String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FlowgateError::Network)?;

        Ok(Self {
            client,
            name,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            custom_headers,
            timeout,
            max_retries: max_retries.max(1),
        })
    }

    /// Get the endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build default headers for a request.
    ///
    /// Content-Type is left to the body builder: `.json()` sets it, and
    /// multipart requests need their boundary header kept intact.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        for (key, value) in &self.custom_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }

        headers
    }

    /// Send a request, retrying transient failures with exponential backoff.
    ///
    /// The builder closure is invoked once per attempt so non-cloneable
    /// bodies (multipart) can be rebuilt. Returns the successful response,
    /// or the last error once the attempt budget is exhausted.
    pub async fn execute<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<FlowgateError> = None;

        for attempt in 0..self.max_retries {
            let response = build(&self.client).headers(self.headers()).send().await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    let err = if e.is_timeout() {
                        FlowgateError::Timeout(self.timeout)
                    } else {
                        FlowgateError::Network(e)
                    };
                    if attempt < self.max_retries - 1 {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            endpoint = %self.name,
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            error = %err,
                            "Retrying after transport error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_error = Some(err);
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);

                last_error = Some(FlowgateError::RateLimited {
                    retry_after_secs: retry_after,
                });

                if attempt < self.max_retries - 1 {
                    debug!(
                        endpoint = %self.name,
                        attempt = attempt,
                        retry_after_secs = retry_after,
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if status == 401 {
                // Retrying a bad key cannot succeed
                return Err(FlowgateError::AuthenticationFailed);
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                let err = FlowgateError::Api { status, message };

                if !RETRYABLE_STATUSES.contains(&status) {
                    return Err(err);
                }

                if attempt < self.max_retries - 1 {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    debug!(
                        endpoint = %self.name,
                        attempt = attempt,
                        status = status,
                        backoff_secs = backoff.as_secs(),
                        "Retrying after server error"
                    );
                    tokio::time::sleep(backoff).await;
                }
                last_error = Some(err);
                continue;
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| FlowgateError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: "unknown error".to_string(),
        }))
    }

    /// GET a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.execute(|client| client.get(&url)).await?;
        Self::decode(response).await
    }

    /// GET a JSON resource with query parameters.
    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let response = self
            .execute(|client| client.get(&url).query(query))
            .await?;
        Self::decode(response).await
    }

    /// POST a JSON body, decode a JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        let response = self.execute(|client| client.post(&url).json(body)).await?;
        Self::decode(response).await
    }

    /// POST with no body, decode a JSON response.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.execute(|client| client.post(&url)).await?;
        Self::decode(response).await
    }

    /// PUT a JSON body, decode a JSON response.
    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        let response = self.execute(|client| client.put(&url).json(body)).await?;
        Self::decode(response).await
    }

    /// DELETE with an optional JSON body, decode a JSON response.
    pub async fn delete_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let url = self.url(path);
        let response = self
            .execute(|client| {
                let builder = client.delete(&url);
                match body {
                    Some(b) => builder.json(b),
                    None => builder,
                }
            })
            .await?;
        Self::decode(response).await
    }

    /// POST a multipart form built per attempt from the given parts.
    pub async fn post_multipart<T, F>(&self, path: &str, form: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::multipart::Form,
    {
        let url = self.url(path);
        let response = self
            .execute(|client| client.post(&url).multipart(form()))
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| FlowgateError::ParseError(format!("Failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(
            "test".to_string(),
            Some("key-123".to_string()),
            "http://localhost:8000/v1/".to_string(),
            HashMap::from([("X-Team".to_string(), "search".to_string())]),
            30,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_url_join() {
        let c = client();
        assert_eq!(c.base_url(), "http://localhost:8000/v1");
        assert_eq!(c.url("/datasets"), "http://localhost:8000/v1/datasets");
        assert_eq!(c.url("results/job-1"), "http://localhost:8000/v1/results/job-1");
    }

    #[test]
    fn test_default_headers() {
        let headers = client().headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer key-123");
        assert_eq!(headers.get("X-Team").unwrap(), "search");
    }

    #[test]
    fn test_no_auth_header_without_key() {
        let c = HttpClient::new(
            "local".to_string(),
            None,
            "http://localhost:8000/v1".to_string(),
            HashMap::new(),
            30,
            3,
        )
        .unwrap();
        assert!(c.headers().get(AUTHORIZATION).is_none());
    }
}
