// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion adapter trait for LLM provider integrations.

use async_trait::async_trait;

use crate::error::TaxsortError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for a chat-completion style LLM API.
///
/// One call produces one full response. Timeouts are enforced by callers,
/// which treat an elapsed deadline as a hard failure of the current batch.
#[async_trait]
pub trait CompletionAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, TaxsortError>;
}
