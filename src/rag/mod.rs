//! Retrieval-side document model, retriever and context assembly.
pub mod context;
pub mod retriever;

use serde::{Deserialize, Serialize};

use crate::db::models::{ChunkSource, StoredChunk};
use crate::db::search::SearchResult;

/// A retrieved chunk as handed to prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(rename = "chunkId", default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(
        rename = "original_chunkId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_chunk_id: Option<String>,
    pub source: ChunkSource,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub section: Vec<String>,
    #[serde(default)]
    pub file: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub is_dependency: bool,
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Document {
    pub fn from_chunk(chunk: StoredChunk) -> Self {
        Self {
            id: chunk.chunk_id.clone(),
            text: chunk.content,
            metadata: DocumentMetadata {
                chunk_id: Some(chunk.chunk_id),
                original_chunk_id: None,
                source: chunk.source,
                project: chunk.project,
                repo: chunk.repo,
                section: chunk.section,
                file: chunk.file,
                functions: chunk.functions.unwrap_or_default(),
                is_dependency: false,
                score: None,
            },
        }
    }

    pub fn from_search(result: SearchResult) -> Self {
        let mut doc = Self::from_chunk(result.chunk);
        doc.metadata.score = Some(result.similarity);
        doc
    }

    /// A chunk pulled in through another chunk's dependency list.
    pub fn dependency(chunk: StoredChunk) -> Self {
        let mut doc = Self::from_chunk(chunk);
        doc.metadata.original_chunk_id = doc.metadata.chunk_id.clone();
        doc.metadata.is_dependency = true;
        doc
    }

    /// Store identity: `original_chunkId`, else `chunkId`, else the document id.
    pub fn chunk_key(&self) -> &str {
        self.metadata
            .original_chunk_id
            .as_deref()
            .or(self.metadata.chunk_id.as_deref())
            .unwrap_or(&self.id)
    }
}
