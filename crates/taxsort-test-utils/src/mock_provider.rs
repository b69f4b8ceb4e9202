// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock completion provider for deterministic testing.
//!
//! `MockProvider` implements `CompletionAdapter` with pre-configured replies,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use taxsort_core::traits::adapter::PluginAdapter;
use taxsort_core::traits::provider::CompletionAdapter;
use taxsort_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, TokenUsage,
};
use taxsort_core::TaxsortError;

/// A queued reply: text, or a provider failure with the given message.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Failure(String),
}

/// A mock completion provider that returns pre-configured responses.
///
/// Replies are popped from a FIFO queue. When the queue is empty,
/// a default "mock response" text is returned. Every request is recorded so
/// tests can assert on the prompts that were sent.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    delay: Option<Duration>,
}

impl MockProvider {
    /// Create a new mock provider with an empty reply queue.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(
                responses.into_iter().map(Reply::Text).collect(),
            )),
            ..Self::new()
        }
    }

    /// Delay every reply, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(Reply::Text(text.into()));
    }

    /// Queue a provider error.
    pub async fn add_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(Reply::Failure(message.into()));
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of completion calls made.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next_reply(&self) -> Reply {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Reply::Text("mock response".to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for MockProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, TaxsortError> {
        self.requests.lock().await.push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_reply().await {
            Reply::Text(content) => Ok(CompletionResponse {
                content,
                model: "mock-model".to_string(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            }),
            Reply::Failure(message) => Err(TaxsortError::Provider {
                message,
                source: None,
            }),
        }
    }
}
