use serde::{Deserialize, Serialize};

/// Chunk category. Unknown stored values read back as `Others`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSource {
    Code,
    Documentation,
    Others,
}

impl ChunkSource {
    pub const ALL: [ChunkSource; 3] = [
        ChunkSource::Code,
        ChunkSource::Documentation,
        ChunkSource::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkSource::Code => "code",
            ChunkSource::Documentation => "documentation",
            ChunkSource::Others => "others",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "code" => ChunkSource::Code,
            "documentation" => ChunkSource::Documentation,
            _ => ChunkSource::Others,
        }
    }
}

/// A chunk about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub chunk_id: String,
    pub content: String,
    pub source: ChunkSource,
    pub project: Option<String>,
    pub repo: Option<String>,
    pub section: Vec<String>,
    pub file: Vec<String>,
    pub version: Option<String>,
}

/// A chunk as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    /// Store-internal row id, used as the resolver's scan cursor.
    pub seq: i64,
    pub chunk_id: String,
    pub content: String,
    pub source: ChunkSource,
    pub project: Option<String>,
    pub repo: Option<String>,
    pub section: Vec<String>,
    pub file: Vec<String>,
    pub version: Option<String>,
    /// Dependency adjacency; `None` until the resolver has visited the chunk.
    pub functions: Option<Vec<String>>,
}

/// Where a called name may resolve to a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeFilter<'a> {
    pub source: ChunkSource,
    pub project: Option<&'a str>,
    pub repo: Option<&'a str>,
    /// Exact ordered match when non-empty, ignored when empty.
    pub section: &'a [String],
    /// Exact ordered match when non-empty, ignored when empty.
    pub file: &'a [String],
}

impl<'a> ScopeFilter<'a> {
    /// Code chunks sharing `chunk`'s project, repo, section and file.
    pub fn for_chunk(chunk: &'a StoredChunk) -> Self {
        Self {
            source: ChunkSource::Code,
            project: chunk.project.as_deref(),
            repo: chunk.repo.as_deref(),
            section: &chunk.section,
            file: &chunk.file,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub added: usize,
    /// Chunks whose `chunk_id` already existed.
    pub skipped: usize,
}
