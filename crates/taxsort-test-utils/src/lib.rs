// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Taxsort integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock completion provider with pre-configured responses
//! - [`MockEmbedder`] - Deterministic letter-histogram embeddings
//! - [`TestHarness`] - Temp storage, memory and configuration wired together
//! - [`pdf`] - Minimal PDF documents and category header pages

pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;
pub mod pdf;

pub use harness::TestHarness;
pub use mock_embedder::MockEmbedder;
pub use mock_provider::MockProvider;
