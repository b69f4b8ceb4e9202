// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reclassification of classified project files.
//!
//! Updates arrive either explicitly or as a natural-language instruction.
//! Every change goes to the persistent store first; the memory snapshot is
//! then rebuilt from it with [`resync`].

pub mod engine;
pub mod sync;
pub mod types;

pub use engine::{ReclassificationEngine, reclassification_settings};
pub use sync::{classified_records, resync};
pub use types::{
    Interpretation, ReclassificationResult, ReclassificationUpdate, UpdateOutcome, download_url,
};
