//! Fixtures shared by store-backed unit tests.
use super::Db;
use super::models::{ChunkSource, InsertOutcome, NewChunk};

pub(crate) fn code_chunk(id: &str, content: &str, project: &str, repo: &str, file: &[&str]) -> NewChunk {
    NewChunk {
        chunk_id: id.to_string(),
        content: content.to_string(),
        source: ChunkSource::Code,
        project: Some(project.to_string()),
        repo: Some(repo.to_string()),
        section: Vec::new(),
        file: file.iter().map(|s| s.to_string()).collect(),
        version: None,
    }
}

pub(crate) fn doc_chunk(id: &str, content: &str, project: &str, repo: &str) -> NewChunk {
    NewChunk {
        chunk_id: id.to_string(),
        content: content.to_string(),
        source: ChunkSource::Documentation,
        project: Some(project.to_string()),
        repo: Some(repo.to_string()),
        section: vec!["Guide".to_string()],
        file: vec!["README.md".to_string()],
        version: None,
    }
}

pub(crate) fn seed(db: &mut Db, chunks: &[NewChunk]) -> InsertOutcome {
    let embeddings = vec![vec![0.1f32; super::EMBEDDING_DIMENSIONS]; chunks.len()];
    db.insert_chunks(chunks, &embeddings).unwrap()
}
