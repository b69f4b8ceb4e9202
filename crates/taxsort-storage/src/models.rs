// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `taxsort-core::types` for use across
//! adapter trait boundaries. This module re-exports them for convenience
//! within the storage crate.

pub use taxsort_core::types::{
    AppliedChange, CategoryAssignment, CategoryChange, Project, ProjectFile, ProjectStatus,
    QueueEntry,
};
