//! The narrow chunk-store contract used by dependency resolution and expansion.
use super::Db;
use super::models::{ScopeFilter, StoredChunk};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Resolver candidates as seen at the start of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSnapshot {
    pub total: usize,
    /// Highest row id among the candidates; pages never go past it.
    pub upper_bound: i64,
}

pub trait ChunkStore {
    /// All chunks in a scope, in insertion order.
    fn find_in_scope(&self, scope: &ScopeFilter<'_>) -> Result<Vec<StoredChunk>, StoreError>;

    /// Bulk lookup by chunk id. Missing ids are absent from the result.
    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<StoredChunk>, StoreError>;

    /// Persists a dependency list. Returns whether the stored value changed.
    fn update_functions(&self, chunk_id: &str, functions: &[String]) -> Result<bool, StoreError>;

    fn candidate_snapshot(&self, force: bool) -> Result<CandidateSnapshot, StoreError>;

    fn candidate_page(
        &self,
        after: i64,
        upper_bound: i64,
        limit: usize,
        force: bool,
    ) -> Result<Vec<StoredChunk>, StoreError>;
}

impl ChunkStore for Db {
    fn find_in_scope(&self, scope: &ScopeFilter<'_>) -> Result<Vec<StoredChunk>, StoreError> {
        Ok(Db::find_in_scope(self, scope)?)
    }

    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<StoredChunk>, StoreError> {
        Ok(Db::find_by_ids(self, ids)?)
    }

    fn update_functions(&self, chunk_id: &str, functions: &[String]) -> Result<bool, StoreError> {
        Ok(Db::update_functions(self, chunk_id, functions)? > 0)
    }

    fn candidate_snapshot(&self, force: bool) -> Result<CandidateSnapshot, StoreError> {
        let (total, upper_bound) = self.count_resolution_candidates(force)?;
        Ok(CandidateSnapshot { total, upper_bound })
    }

    fn candidate_page(
        &self,
        after: i64,
        upper_bound: i64,
        limit: usize,
        force: bool,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        Ok(self.find_resolution_page(after, upper_bound, limit, force)?)
    }
}
