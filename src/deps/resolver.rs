use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::db::models::{ScopeFilter, StoredChunk};
use crate::db::store::{ChunkStore, StoreError};
use crate::indexer::functions::{NameSet, extract_function_calls, extract_function_definitions};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Totals of one resolver run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ResolveStats {
    pub total_processed: usize,
    pub total_updated: usize,
    pub total_dependencies_added: usize,
    pub total_failed: usize,
}

impl ResolveStats {
    /// Mean dependency count over updated chunks, 0 when nothing was updated.
    pub fn average_dependencies(&self) -> f64 {
        if self.total_updated == 0 {
            0.0
        } else {
            self.total_dependencies_added as f64 / self.total_updated as f64
        }
    }
}

/// Links code chunks to the chunks defining the functions they call.
///
/// Definitions are cached per chunk id for the lifetime of the resolver, so
/// one resolver should cover exactly one run over an unchanging corpus.
pub struct DependencyResolver<'s, S: ChunkStore + ?Sized> {
    store: &'s S,
    definitions: HashMap<String, NameSet>,
}

impl<'s, S: ChunkStore + ?Sized> DependencyResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            definitions: HashMap::new(),
        }
    }

    fn definitions_of(&mut self, chunk: &StoredChunk) -> &NameSet {
        self.definitions
            .entry(chunk.chunk_id.clone())
            .or_insert_with(|| extract_function_definitions(&chunk.content))
    }

    /// Ids of the in-scope chunks defining something `chunk` calls, without
    /// persisting anything. Never includes `chunk` itself.
    pub fn dependencies_of(&mut self, chunk: &StoredChunk) -> Result<Vec<String>, StoreError> {
        if chunk.content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let calls = extract_function_calls(&chunk.content);
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.store.find_in_scope(&ScopeFilter::for_chunk(chunk))?;

        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();
        for name in &calls {
            for candidate in &candidates {
                if candidate.chunk_id == chunk.chunk_id || seen.contains(&candidate.chunk_id) {
                    continue;
                }
                if self.definitions_of(candidate).contains(name) {
                    seen.insert(candidate.chunk_id.clone());
                    dependencies.push(candidate.chunk_id.clone());
                }
            }
        }

        debug!(
            "Chunk {} calls {} function(s), {} dependency chunk(s)",
            chunk.chunk_id,
            calls.len(),
            dependencies.len()
        );
        Ok(dependencies)
    }

    /// Resolves and persists one chunk's dependencies. Returns the list and
    /// whether the stored value changed.
    pub fn resolve(&mut self, chunk: &StoredChunk) -> Result<(Vec<String>, bool), StoreError> {
        let dependencies = self.dependencies_of(chunk)?;
        let changed = self.store.update_functions(&chunk.chunk_id, &dependencies)?;
        Ok((dependencies, changed))
    }

    /// Visits every candidate code chunk once, in pages of `batch_size`.
    /// A chunk that fails is logged and counted, the run carries on.
    pub fn run(&mut self, batch_size: usize, force: bool) -> Result<ResolveStats, ResolveError> {
        if batch_size == 0 {
            return Err(ResolveError::InvalidBatchSize);
        }

        let snapshot = self.store.candidate_snapshot(force)?;
        info!(
            "Resolving function dependencies for {} chunk(s) (batch size {}, force {})",
            snapshot.total, batch_size, force
        );

        let mut stats = ResolveStats::default();
        let mut cursor = 0;
        loop {
            let page = self
                .store
                .candidate_page(cursor, snapshot.upper_bound, batch_size, force)?;
            let page_len = page.len();

            for chunk in &page {
                cursor = chunk.seq;
                stats.total_processed += 1;

                match self.resolve(chunk) {
                    Ok((dependencies, changed)) => {
                        if changed && !dependencies.is_empty() {
                            stats.total_updated += 1;
                            stats.total_dependencies_added += dependencies.len();
                        }
                    }
                    Err(e) => {
                        stats.total_failed += 1;
                        error!("Failed to resolve dependencies for chunk {}: {e}", chunk.chunk_id);
                    }
                }
            }

            if page_len > 0 {
                info!(
                    "Processed {}/{} chunk(s), {} updated",
                    stats.total_processed, snapshot.total, stats.total_updated
                );
            }
            if page_len < batch_size {
                break;
            }
        }

        info!(
            "Dependency resolution finished: {} processed, {} updated, {} dependencies added, {} failed",
            stats.total_processed,
            stats.total_updated,
            stats.total_dependencies_added,
            stats.total_failed
        );
        Ok(stats)
    }
}

/// Resolves and persists the dependencies of a single chunk.
pub fn resolve_chunk_dependencies<S: ChunkStore + ?Sized>(
    store: &S,
    chunk: &StoredChunk,
) -> Result<Vec<String>, StoreError> {
    DependencyResolver::new(store)
        .resolve(chunk)
        .map(|(dependencies, _)| dependencies)
}

/// Runs the batch resolver over the store's code chunks.
pub fn add_function_dependencies<S: ChunkStore + ?Sized>(
    store: &S,
    batch_size: usize,
    force: bool,
) -> Result<ResolveStats, ResolveError> {
    DependencyResolver::new(store).run(batch_size, force)
}
