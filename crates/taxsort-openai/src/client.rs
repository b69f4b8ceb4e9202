// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for Azure OpenAI deployments.
//!
//! Provides [`AzureClient`] which handles URL construction, the `api-key`
//! header, and retry of transient errors.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use taxsort_core::TaxsortError;

use crate::types::{
    ApiErrorResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
};

/// HTTP client for one Azure OpenAI resource.
///
/// Transient errors (429, 500, 503, 529) are retried once after a delay.
/// The overall call deadline is enforced by callers.
#[derive(Debug, Clone)]
pub struct AzureClient {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl AzureClient {
    /// Creates a client for `endpoint` (e.g. `https://res.openai.azure.com`).
    pub fn new(api_key: &str, endpoint: &str, api_version: &str) -> Result<Self, TaxsortError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key).map_err(|e| {
                TaxsortError::Config(format!("invalid API key header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| TaxsortError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// `{endpoint}/openai/deployments/{deployment}/{operation}?api-version=..`
    pub fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{deployment}/{operation}?api-version={}",
            self.endpoint, self.api_version
        )
    }

    pub async fn chat_completion(
        &self,
        deployment: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, TaxsortError> {
        let url = self.deployment_url(deployment, "chat/completions");
        self.post(&url, request).await
    }

    pub async fn embeddings(
        &self,
        deployment: &str,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, TaxsortError> {
        let url = self.deployment_url(deployment, "embeddings");
        self.post(&url, request).await
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, TaxsortError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| TaxsortError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| TaxsortError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&text).map_err(|e| TaxsortError::Provider {
                    message: format!("failed to parse API response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            let text = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %text, "transient error, will retry");
                last_error = Some(TaxsortError::Provider {
                    message: format!("API returned {status}: {text}"),
                    source: None,
                });
                continue;
            }

            return Err(TaxsortError::Provider {
                message: api_error_message(status, &text),
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| TaxsortError::Provider {
            message: "request failed after retries".into(),
            source: None,
        }))
    }
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!(
            "Azure OpenAI error ({}): {}",
            api_err.error.code.as_deref().unwrap_or("unknown"),
            api_err.error.message
        ),
        Err(_) => format!("API returned {status}: {body}"),
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}
