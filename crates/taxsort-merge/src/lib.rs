// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merged-document assembly for Taxsort projects.
//!
//! A merged artifact holds one header page per category followed by the
//! documents currently assigned to that category. Page handling sits behind
//! [`PageSource`] so the ordering rules can be exercised without real PDFs.

pub mod coordinator;
pub mod pages;

pub use coordinator::{DocumentMergeCoordinator, MergeInput, MergeResult};
pub use pages::{LopdfPageSource, PageSource};
