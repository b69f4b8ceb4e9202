// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification memory for the Taxsort pipeline.
//!
//! Keeps classification history, document summaries and one snapshot of
//! classification results per project. A SQLite vector backend provides
//! similarity search; an in-process store takes over whenever that backend
//! is missing or failing.
//!
//! ## Architecture
//!
//! - **MemoryStore**: the entry point, combining both backends
//! - **VectorBackend**: BLOB embeddings in SQLite, ranked by cosine similarity
//! - **LocalBackend**: insertion-ordered list with substring search
//! - **project**: per-project snapshot reads and updates
//! - **history**: classification and summary helpers used when building prompts

pub mod backend;
pub mod history;
pub mod local;
pub mod project;
pub mod store;
pub mod types;
pub mod vector;

pub use backend::MemoryBackend;
pub use local::LocalBackend;
pub use store::MemoryStore;
pub use types::*;
pub use vector::VectorBackend;
