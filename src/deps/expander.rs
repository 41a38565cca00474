use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::db::models::{ChunkSource, StoredChunk};
use crate::db::store::{ChunkStore, StoreError};
use crate::rag::Document;
use crate::rag::retriever::RetrievedContext;

pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dependency expansion timed out after {0:?}")]
    Timeout(Duration),
}

/// Grows a set of code documents along the stored `functions` adjacency.
///
/// Breadth-first, one batched lookup per round. Every id is fetched at most
/// once, which also makes cyclic graphs terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyExpander {
    pub max_depth: usize,
    pub timeout: Duration,
}

impl Default for DependencyExpander {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_TIMEOUT)
    }
}

impl DependencyExpander {
    pub fn new(max_depth: usize, timeout: Duration) -> Self {
        Self { max_depth, timeout }
    }

    /// Seeds (deduplicated, in order) followed by their dependencies up to
    /// `max_depth` hops away, in discovery order.
    pub fn expand<S: ChunkStore + ?Sized>(
        &self,
        store: &S,
        seeds: &[Document],
    ) -> Result<Vec<Document>, ExpandError> {
        let started = Instant::now();
        let mut processed: Vec<Document> = Vec::with_capacity(seeds.len());
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = Vec::new();

        for doc in seeds {
            let key = doc.chunk_key().to_string();
            if scheduled.insert(key.clone()) {
                frontier.push(key);
                processed.push(doc.clone());
            }
        }
        if self.max_depth == 0 {
            return Ok(processed);
        }
        let seed_count = processed.len();

        let mut depth = 0;
        while !frontier.is_empty() {
            if started.elapsed() >= self.timeout {
                return Err(ExpandError::Timeout(self.timeout));
            }

            let fetched = store.find_by_ids(&frontier)?;
            let mut by_id: HashMap<String, StoredChunk> = fetched
                .into_iter()
                .map(|chunk| (chunk.chunk_id.clone(), chunk))
                .collect();

            let mut next = Vec::new();
            for id in &frontier {
                let Some(chunk) = by_id.remove(id) else {
                    debug!("Dependency chunk {id} not found in store");
                    continue;
                };

                if depth < self.max_depth {
                    for dep in chunk.functions.iter().flatten() {
                        if scheduled.insert(dep.clone()) {
                            next.push(dep.clone());
                        }
                    }
                }

                // seeds fetched in the first round keep their retrieved form
                if depth > 0 {
                    processed.push(Document::dependency(chunk));
                }
            }

            frontier = next;
            depth += 1;
        }

        debug!(
            "Expanded {} seed(s) to {} document(s) in {:?}",
            seed_count,
            processed.len(),
            started.elapsed()
        );
        Ok(processed)
    }

    /// Best-effort [`expand`](Self::expand): any failure, or a missing store,
    /// leaves the seeds as they were.
    pub fn expand_or_original<S: ChunkStore + ?Sized>(
        &self,
        store: Option<&S>,
        seeds: &[Document],
    ) -> Vec<Document> {
        let Some(store) = store else {
            warn!("Chunk store unavailable, skipping dependency expansion");
            return seeds.to_vec();
        };

        match self.expand(store, seeds) {
            Ok(expanded) => expanded,
            Err(e) => {
                warn!("Dependency expansion failed, using retrieved chunks only: {e}");
                seeds.to_vec()
            }
        }
    }

    /// Expands the code partition of a retrieved context in place. Other
    /// categories are left untouched.
    pub fn expand_context<S: ChunkStore + ?Sized>(
        &self,
        store: Option<&S>,
        context: &mut RetrievedContext,
    ) {
        if let Some(code) = context.get_mut(&ChunkSource::Code) {
            if code.is_empty() {
                return;
            }
            *code = self.expand_or_original(store, code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::db::testing::{code_chunk, seed};

    /// One code chunk per entry, with its space-separated dependency ids.
    fn linked_store(edges: &[(&str, &str)]) -> Db {
        let mut db = Db::open_in_memory().unwrap();
        let chunks: Vec<_> = edges
            .iter()
            .map(|(id, _)| code_chunk(id, &format!("(= ({id}) 1)"), "P", "R", &["g.metta"]))
            .collect();
        seed(&mut db, &chunks);
        for (id, deps) in edges {
            let deps: Vec<String> = deps.split_whitespace().map(str::to_string).collect();
            db.update_functions(id, &deps).unwrap();
        }
        db
    }

    fn seed_docs(db: &Db, ids: &[&str]) -> Vec<Document> {
        ids.iter()
            .map(|id| Document::from_chunk(db.get_chunk(id).unwrap().unwrap()))
            .collect()
    }

    fn keys(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.chunk_key()).collect()
    }

    #[test]
    fn test_cycle_terminates() {
        let db = linked_store(&[("A", "B"), ("B", "A")]);
        let expanded = DependencyExpander::new(3, DEFAULT_TIMEOUT)
            .expand(&db, &seed_docs(&db, &["A"]))
            .unwrap();
        assert_eq!(keys(&expanded), vec!["A", "B"]);
        assert!(!expanded[0].metadata.is_dependency);
        assert!(expanded[1].metadata.is_dependency);
    }

    #[test]
    fn test_depth_bound_on_chain() {
        let db = linked_store(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "D"),
            ("D", "E"),
            ("E", ""),
        ]);
        let seeds = seed_docs(&db, &["A"]);

        let two = DependencyExpander::new(2, DEFAULT_TIMEOUT).expand(&db, &seeds).unwrap();
        assert_eq!(keys(&two), vec!["A", "B", "C"]);

        let all = DependencyExpander::new(10, DEFAULT_TIMEOUT).expand(&db, &seeds).unwrap();
        assert_eq!(keys(&all), vec!["A", "B", "C", "D", "E"]);

        let none = DependencyExpander::new(0, DEFAULT_TIMEOUT).expand(&db, &seeds).unwrap();
        assert_eq!(keys(&none), vec!["A"]);
    }

    #[test]
    fn test_breadth_first_order_and_shared_deps() {
        let db = linked_store(&[
            ("A", "C D"),
            ("B", "D E"),
            ("C", ""),
            ("D", "A"),
            ("E", ""),
        ]);
        let expanded = DependencyExpander::default()
            .expand(&db, &seed_docs(&db, &["A", "B"]))
            .unwrap();
        assert_eq!(keys(&expanded), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_missing_ids_are_skipped() {
        let db = linked_store(&[("A", "gone B"), ("B", "gone")]);
        let expanded = DependencyExpander::default()
            .expand(&db, &seed_docs(&db, &["A"]))
            .unwrap();
        assert_eq!(keys(&expanded), vec!["A", "B"]);
    }

    #[test]
    fn test_unresolved_seed_has_no_dependencies() {
        let mut db = Db::open_in_memory().unwrap();
        seed(&mut db, &[code_chunk("A", "(= (a) (b))", "P", "R", &["x.metta"])]);
        let seeds = seed_docs(&db, &["A"]);
        let expanded = DependencyExpander::default().expand(&db, &seeds).unwrap();
        assert_eq!(expanded, seeds);
    }

    #[test]
    fn test_duplicate_seeds_collapse() {
        let db = linked_store(&[("A", "B"), ("B", "")]);
        let expanded = DependencyExpander::default()
            .expand(&db, &seed_docs(&db, &["A", "A"]))
            .unwrap();
        assert_eq!(keys(&expanded), vec!["A", "B"]);
    }

    #[test]
    fn test_zero_depth_still_collapses_duplicates() {
        let db = linked_store(&[("A", "B"), ("B", "")]);
        let expanded = DependencyExpander::new(0, DEFAULT_TIMEOUT)
            .expand(&db, &seed_docs(&db, &["A", "B", "A"]))
            .unwrap();
        assert_eq!(keys(&expanded), vec!["A", "B"]);
    }

    #[test]
    fn test_timeout_falls_back_to_seeds() {
        let db = linked_store(&[("A", "B"), ("B", "")]);
        let seeds = seed_docs(&db, &["A"]);
        let expander = DependencyExpander::new(3, Duration::ZERO);

        assert!(matches!(
            expander.expand(&db, &seeds),
            Err(ExpandError::Timeout(_))
        ));
        assert_eq!(expander.expand_or_original(Some(&db), &seeds), seeds);
    }

    #[test]
    fn test_missing_store_falls_back_to_seeds() {
        let db = linked_store(&[("A", "B"), ("B", "")]);
        let seeds = seed_docs(&db, &["A"]);
        let expanded = DependencyExpander::default().expand_or_original::<Db>(None, &seeds);
        assert_eq!(expanded, seeds);
    }

    struct DownStore;

    impl ChunkStore for DownStore {
        fn find_in_scope(
            &self,
            _scope: &crate::db::models::ScopeFilter<'_>,
        ) -> Result<Vec<StoredChunk>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        fn find_by_ids(&self, _ids: &[String]) -> Result<Vec<StoredChunk>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        fn update_functions(&self, _chunk_id: &str, _functions: &[String]) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        fn candidate_snapshot(
            &self,
            _force: bool,
        ) -> Result<crate::db::store::CandidateSnapshot, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        fn candidate_page(
            &self,
            _after: i64,
            _upper_bound: i64,
            _limit: usize,
            _force: bool,
        ) -> Result<Vec<StoredChunk>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_store_failure_falls_back_to_seeds() {
        let db = linked_store(&[("A", "B"), ("B", "")]);
        let seeds = seed_docs(&db, &["A"]);
        let expander = DependencyExpander::default();

        assert!(matches!(
            expander.expand(&DownStore, &seeds),
            Err(ExpandError::Store(_))
        ));
        assert_eq!(expander.expand_or_original(Some(&DownStore), &seeds), seeds);
    }

    #[test]
    fn test_expand_context_only_touches_code() {
        let db = linked_store(&[("A", "B"), ("B", "")]);
        let mut context = RetrievedContext::new();
        context.insert(ChunkSource::Code, seed_docs(&db, &["A"]));
        context.insert(ChunkSource::Documentation, Vec::new());

        DependencyExpander::default().expand_context(Some(&db), &mut context);
        assert_eq!(keys(&context[&ChunkSource::Code]), vec!["A", "B"]);
        assert!(context[&ChunkSource::Documentation].is_empty());
    }
}
