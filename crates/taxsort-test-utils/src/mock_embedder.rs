// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding adapter.
//!
//! Vectors are letter-frequency histograms, so texts sharing vocabulary are
//! close under cosine similarity. Good enough to exercise ranking without a
//! model.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use taxsort_core::traits::adapter::PluginAdapter;
use taxsort_core::traits::embedding::EmbeddingAdapter;
use taxsort_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use taxsort_core::TaxsortError;

/// Width of every vector produced.
pub const MOCK_DIMENSIONS: usize = 26;

#[derive(Default)]
pub struct MockEmbedder {
    failing: AtomicBool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail until reset, to simulate an outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; MOCK_DIMENSIONS];
        for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
            v[usize::from(c as u8 - b'a')] += 1.0;
        }
        v
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        if self.failing.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("simulated outage".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, TaxsortError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TaxsortError::Provider {
                message: "embedding service unavailable".into(),
                source: None,
            });
        }
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| Self::vector_for(t)).collect(),
            dimensions: MOCK_DIMENSIONS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_letter_counts() {
        let embedder = MockEmbedder::new();
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["aab".into(), "Zz!".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.dimensions, 26);
        assert_eq!(out.embeddings[0][0], 2.0);
        assert_eq!(out.embeddings[0][1], 1.0);
        assert_eq!(out.embeddings[1][25], 2.0);
    }

    #[tokio::test]
    async fn failing_mode_errors() {
        let embedder = MockEmbedder::new();
        embedder.set_failing(true);
        assert!(
            embedder
                .embed(EmbeddingInput {
                    texts: vec!["x".into()]
                })
                .await
                .is_err()
        );
        assert!(matches!(
            embedder.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}
