use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use super::Document;
use crate::db::Db;
use crate::db::models::ChunkSource;
use crate::db::search::SearchFilter;
use crate::deps::DependencyExpander;
use crate::embedder::{Embedder, EmbedderError};

/// Retrieved documents keyed by category, iterated code first.
pub type RetrievedContext = BTreeMap<ChunkSource, Vec<Document>>;

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("failed to embed query: {0}")]
    Embed(#[from] EmbedderError),

    #[error("vector search failed: {0}")]
    Search(#[from] rusqlite::Error),
}

/// Top-k vector search run once per chunk category.
pub struct Retriever<'a, E: Embedder + ?Sized> {
    db: &'a Db,
    embedder: &'a E,
    top_k: usize,
    project: Option<&'a str>,
    repo: Option<&'a str>,
}

impl<'a, E: Embedder + ?Sized> Retriever<'a, E> {
    pub fn new(db: &'a Db, embedder: &'a E, top_k: usize) -> Self {
        Self {
            db,
            embedder,
            top_k,
            project: None,
            repo: None,
        }
    }

    /// Restricts every search to a project and/or repo.
    pub fn scoped(mut self, project: Option<&'a str>, repo: Option<&'a str>) -> Self {
        self.project = project;
        self.repo = repo;
        self
    }

    pub fn retrieve(&self, query: &str) -> Result<RetrievedContext, RetrieveError> {
        let query_vector = self.embedder.embed(query)?;

        let mut context = RetrievedContext::new();
        for source in ChunkSource::ALL {
            let filter = SearchFilter {
                source: Some(source),
                project: self.project,
                repo: self.repo,
            };
            let docs: Vec<Document> = self
                .db
                .search(&query_vector, self.top_k, Some(&filter))?
                .into_iter()
                .map(Document::from_search)
                .collect();
            debug!("Retrieved {} {} chunk(s)", docs.len(), source.as_str());
            context.insert(source, docs);
        }
        Ok(context)
    }

    /// [`retrieve`](Self::retrieve), then grow the code partition along its
    /// dependencies. Expansion problems never fail the retrieval.
    pub fn retrieve_with_dependencies(
        &self,
        query: &str,
        expander: &DependencyExpander,
    ) -> Result<RetrievedContext, RetrieveError> {
        let mut context = self.retrieve(query)?;
        expander.expand_context(Some(self.db), &mut context);
        Ok(context)
    }
}
