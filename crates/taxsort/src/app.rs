// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state for one CLI invocation.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use taxsort_classify::CategoryCatalog;
use taxsort_config::model::TaxsortConfig;
use taxsort_core::{CompletionAdapter, EmbeddingAdapter, StorageAdapter, TaxsortError};
use taxsort_memory::MemoryStore;
use taxsort_openai::{AzureEmbedder, AzureOpenAiProvider};
use taxsort_storage::SqliteStorage;

/// Configuration, persistent store and catalog, opened once per command.
///
/// The completion provider is only built by commands that call the model,
/// so project management works without credentials.
pub struct App {
    pub config: TaxsortConfig,
    pub storage: Arc<dyn StorageAdapter>,
    pub catalog: Arc<CategoryCatalog>,
}

impl App {
    pub async fn open(config: TaxsortConfig) -> Result<Self, TaxsortError> {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let catalog = CategoryCatalog::load(config.catalog.path.as_deref().map(Path::new))?;
        debug!(database = %config.storage.database_path, "application opened");
        Ok(Self {
            config,
            storage: Arc::new(storage),
            catalog: Arc::new(catalog),
        })
    }

    pub fn provider(&self) -> Result<Arc<dyn CompletionAdapter>, TaxsortError> {
        Ok(Arc::new(AzureOpenAiProvider::new(&self.config.llm)?))
    }

    /// The embedding adapter, if one is configured. Problems only disable
    /// the vector backend.
    pub fn embedder(&self) -> Option<Arc<dyn EmbeddingAdapter>> {
        match AzureEmbedder::from_config(&self.config.llm) {
            Ok(Some(embedder)) => Some(Arc::new(embedder)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "embedding adapter unavailable, memory stays local");
                None
            }
        }
    }

    /// Runs `f` with a memory store that is closed afterwards, whatever `f`
    /// returned.
    pub async fn with_memory<T>(
        &self,
        f: impl AsyncFnOnce(Arc<MemoryStore>) -> Result<T, TaxsortError>,
    ) -> Result<T, TaxsortError> {
        let memory = Arc::new(MemoryStore::open(&self.config.memory, self.embedder()).await);
        let result = f(Arc::clone(&memory)).await;
        if let Err(e) = memory.close().await {
            warn!(error = %e, "failed to close memory store");
        }
        result
    }

    pub async fn close(&self) {
        if let Err(e) = self.storage.close().await {
            warn!(error = %e, "failed to close storage");
        }
    }
}
