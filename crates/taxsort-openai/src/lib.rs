// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Azure OpenAI adapters for Taxsort.
//!
//! [`AzureOpenAiProvider`] implements [`CompletionAdapter`] against a chat
//! deployment and [`AzureEmbedder`] implements [`EmbeddingAdapter`] against
//! an embedding deployment of the same resource.

pub mod client;
pub mod types;

use async_trait::async_trait;
use tracing::{debug, info};

use taxsort_config::model::LlmConfig;
use taxsort_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, EmbeddingInput, EmbeddingOutput,
    HealthStatus, TokenUsage,
};
use taxsort_core::{CompletionAdapter, EmbeddingAdapter, PluginAdapter, TaxsortError};

use crate::client::AzureClient;
use crate::types::{ChatMessage, ChatRequest, EmbeddingRequest};

fn client_from_config(config: &LlmConfig) -> Result<AzureClient, TaxsortError> {
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        return Err(TaxsortError::Config(format!(
            "missing LLM credentials: {}",
            missing.join(", ")
        )));
    }
    let api_key = config.resolved_api_key().unwrap_or_default();
    let endpoint = config.endpoint.as_deref().unwrap_or_default();
    AzureClient::new(&api_key, endpoint, &config.api_version)
}

/// Chat-completion adapter for an Azure OpenAI deployment.
///
/// API key resolution order: `llm.api_key` -> `AZURE_OPENAI_API_KEY` -> error.
pub struct AzureOpenAiProvider {
    client: AzureClient,
    deployment: String,
}

impl AzureOpenAiProvider {
    /// Creates a provider, failing with a configuration error when the key,
    /// endpoint or deployment is missing.
    pub fn new(config: &LlmConfig) -> Result<Self, TaxsortError> {
        let client = client_from_config(config)?;
        let deployment = config.deployment.clone().unwrap_or_default();
        info!(deployment = %deployment, "Azure OpenAI provider initialized");
        Ok(Self { client, deployment })
    }

    fn to_chat_request(request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref()
            && !system.is_empty()
        {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));
        ChatRequest {
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for AzureOpenAiProvider {
    fn name(&self) -> &str {
        "azure-openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        // No token-consuming request; a configured client is considered healthy.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        debug!("Azure OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for AzureOpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, TaxsortError> {
        let chat = Self::to_chat_request(&request);
        debug!(
            prompt_chars = request.prompt.len(),
            max_tokens = request.max_tokens,
            "sending completion request"
        );
        let response = self.client.chat_completion(&self.deployment, &chat).await?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            TaxsortError::Provider {
                message: "completion response contained no choices".into(),
                source: None,
            }
        })?;
        let content = choice.message.content.ok_or_else(|| TaxsortError::Provider {
            message: format!(
                "completion returned no content (finish_reason: {})",
                choice.finish_reason.as_deref().unwrap_or("unknown")
            ),
            source: None,
        })?;

        let usage = response.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            model: response.model,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

/// Embedding adapter for an Azure OpenAI embedding deployment.
pub struct AzureEmbedder {
    client: AzureClient,
    deployment: String,
}

impl AzureEmbedder {
    /// Returns `Ok(None)` when no embedding deployment is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, TaxsortError> {
        let Some(deployment) = config
            .embedding_deployment
            .clone()
            .filter(|d| !d.trim().is_empty())
        else {
            return Ok(None);
        };
        let client = client_from_config(config)?;
        info!(deployment = %deployment, "Azure OpenAI embedder initialized");
        Ok(Some(Self { client, deployment }))
    }
}

#[async_trait]
impl PluginAdapter for AzureEmbedder {
    fn name(&self) -> &str {
        "azure-openai-embedding"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for AzureEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, TaxsortError> {
        let expected = input.texts.len();
        let response = self
            .client
            .embeddings(&self.deployment, &EmbeddingRequest { input: input.texts })
            .await?;

        let mut data = response.data;
        if data.len() != expected {
            return Err(TaxsortError::Provider {
                message: format!("expected {expected} embeddings, got {}", data.len()),
                source: None,
            });
        }
        data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        let dimensions = embeddings.first().map_or(0, Vec::len);
        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> LlmConfig {
        LlmConfig {
            api_key: Some("test-api-key".into()),
            endpoint: Some(endpoint.into()),
            deployment: Some("gpt-4o".into()),
            embedding_deployment: Some("embed".into()),
            ..LlmConfig::default()
        }
    }

    fn request(system: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            prompt: "Classify these documents".into(),
            system_prompt: system.map(String::from),
            max_tokens: 4000,
            temperature: 0.3,
        }
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let config = LlmConfig {
            api_key: Some("k".into()),
            ..LlmConfig::default()
        };
        let err = AzureOpenAiProvider::new(&config).err().unwrap();
        assert!(matches!(err, TaxsortError::Config(_)));
        assert!(err.to_string().contains("llm.endpoint"));
    }

    #[test]
    fn system_prompt_precedes_user_prompt() {
        let chat = AzureOpenAiProvider::to_chat_request(&request(Some("You classify.")));
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].content, "Classify these documents");

        let chat = AzureOpenAiProvider::to_chat_request(&request(Some("")));
        assert_eq!(chat.messages.len(), 1);
    }

    #[test]
    fn embedder_is_optional() {
        let mut config = config("https://res.openai.azure.com");
        config.embedding_deployment = None;
        assert!(AzureEmbedder::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_maps_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{"role": "system", "content": "You classify."}],
                "max_tokens": 4000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-2024-08-06",
                "choices": [{"message": {"role": "assistant", "content": "[]"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 120, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let provider = AzureOpenAiProvider::new(&config(&server.uri())).unwrap();
        let response = provider.complete(request(Some("You classify."))).await.unwrap();
        assert_eq!(response.content, "[]");
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert_eq!(response.usage.input_tokens, 120);
    }

    #[tokio::test]
    async fn filtered_completion_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}]
            })))
            .mount(&server)
            .await;

        let provider = AzureOpenAiProvider::new(&config(&server.uri())).unwrap();
        let err = provider.complete(request(None)).await.unwrap_err();
        assert!(err.to_string().contains("content_filter"), "got: {err}");
    }

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embed/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = AzureEmbedder::from_config(&config(&server.uri()))
            .unwrap()
            .unwrap();
        let output = embedder
            .embed(EmbeddingInput {
                texts: vec!["first".into(), "second".into()],
            })
            .await
            .unwrap();
        assert_eq!(output.dimensions, 2);
        assert_eq!(output.embeddings[0], vec![1.0, 0.0]);
        assert_eq!(output.embeddings[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn embedding_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let embedder = AzureEmbedder::from_config(&config(&server.uri()))
            .unwrap()
            .unwrap();
        let result = embedder
            .embed(EmbeddingInput {
                texts: vec!["only".into()],
            })
            .await;
        assert!(result.is_err());
    }
}
