use crate::db::Db;
use crate::db::models::{ChunkSource, InsertOutcome, NewChunk};
use crate::embedder::Embedder;
use crate::indexer::{chunker, markdown};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_added: usize,
    pub chunks_skipped: usize,
}

/// A chunk ready for embedding, before ids are assigned.
struct PendingChunk {
    content: String,
    position: usize,
    section: Vec<String>,
    /// Text handed to the embedder; code chunks lead with their symbol names.
    embedding_text: String,
}

/// Stable chunk identity: identical content at the same place in the same
/// repository always hashes to the same id.
pub fn chunk_id(project: &str, repo: &str, file: &[String], position: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project.as_bytes());
    hasher.update(b"\0");
    hasher.update(repo.as_bytes());
    hasher.update(b"\0");
    hasher.update(file.join("/").as_bytes());
    hasher.update(b"\0");
    hasher.update(position.to_le_bytes());
    hasher.update(b"\0");
    hasher.update(content.as_bytes());

    hasher.finalize()[..16]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: &'a E,
    pub max_chunk_size: usize,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: &'a E, max_chunk_size: usize) -> Self {
        Self {
            db,
            embedder,
            max_chunk_size,
        }
    }

    /// Maps a file extension to the category its chunks are stored under
    fn source_for_extension(ext: &str) -> Option<ChunkSource> {
        match ext {
            "metta" => Some(ChunkSource::Code),
            "md" => Some(ChunkSource::Documentation),
            _ => None,
        }
    }

    /// Indexes every MeTTa and markdown file under `root` as `project`/`repo`.
    ///
    /// With `replace`, all chunks previously stored for the pair are removed
    /// first. Otherwise chunks whose id already exists are skipped.
    pub async fn index_repository<P: AsRef<Path>>(
        &mut self,
        root: P,
        project: &str,
        repo: &str,
        replace: bool,
    ) -> Result<IngestStats> {
        let root = root.as_ref();
        anyhow::ensure!(root.is_dir(), "not a directory: {}", root.display());

        if replace {
            let removed = {
                let db_guard = self.db.lock().await;
                db_guard.delete_repo_chunks(Some(project), Some(repo))?
            };
            info!("Removed {removed} chunk(s) of {project}/{repo}");
        }

        let mut stats = IngestStats::default();

        // Walk builder respects .gitignore by default
        let walker = WalkBuilder::new(root).hidden(false).build();

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            let ext = path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let Some(source) = Self::source_for_extension(ext) else {
                continue;
            };

            match self.index_file(root, path, source, project, repo).await {
                Ok(outcome) => {
                    stats.files_indexed += 1;
                    stats.chunks_added += outcome.added;
                    stats.chunks_skipped += outcome.skipped;
                }
                Err(e) => {
                    warn!("Failed to index {}: {e:#}", path.display());
                    stats.files_failed += 1;
                }
            }
        }

        info!(
            "Indexed {} file(s) of {project}/{repo}: {} chunk(s) added, {} skipped, {} file(s) failed",
            stats.files_indexed, stats.chunks_added, stats.chunks_skipped, stats.files_failed
        );
        Ok(stats)
    }

    async fn index_file(
        &mut self,
        root: &Path,
        path: &Path,
        source: ChunkSource,
        project: &str,
        repo: &str,
    ) -> Result<InsertOutcome> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        // Components rather than a joined string keep paths platform-neutral.
        let file: Vec<String> = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        let pending = match source {
            ChunkSource::Code => chunker::chunk_source(&content, self.max_chunk_size)
                .into_iter()
                .map(|c| PendingChunk {
                    embedding_text: if c.symbols.is_empty() {
                        c.content.clone()
                    } else {
                        format!("{}\n{}", c.symbols.join(" "), c.content)
                    },
                    content: c.content,
                    position: c.position,
                    section: Vec::new(),
                })
                .collect::<Vec<_>>(),
            _ => markdown::chunk_markdown(&content, self.max_chunk_size)
                .into_iter()
                .map(|c| PendingChunk {
                    embedding_text: c.content.clone(),
                    content: c.content,
                    position: c.position,
                    section: c.section,
                })
                .collect(),
        };
        if pending.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let text_refs: Vec<&str> = pending.iter().map(|c| c.embedding_text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;

        let chunks: Vec<NewChunk> = pending
            .into_iter()
            .map(|c| NewChunk {
                chunk_id: chunk_id(project, repo, &file, c.position, &c.content),
                content: c.content,
                source,
                project: Some(project.to_string()),
                repo: Some(repo.to_string()),
                section: c.section,
                file: file.clone(),
                version: None,
            })
            .collect();

        let outcome = {
            let mut db_guard = self.db.lock().await;
            db_guard.insert_chunks(&chunks, &vectors)?
        };
        debug!(
            "{}: {} chunk(s) added, {} skipped",
            file.join("/"),
            outcome.added,
            outcome.skipped
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use std::fs;
    use tempfile::tempdir;

    const FIB: &str = "; Fibonacci\n(: fib (-> Number Number))\n(= (fib 0) 0)\n(= (fib 1) 1)\n(= (fib $n) (+ (fib (- $n 1)) (fib (- $n 2))))\n";

    #[test]
    fn test_chunk_id_is_stable() {
        let file = vec!["lib".to_string(), "fib.metta".to_string()];
        let a = chunk_id("P", "R", &file, 0, FIB);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, chunk_id("P", "R", &file, 0, FIB));
        assert_ne!(a, chunk_id("P", "R", &file, 1, FIB));
        assert_ne!(a, chunk_id("Q", "R", &file, 0, FIB));
    }

    #[tokio::test]
    async fn test_index_repository() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("lib")).unwrap();
        fs::write(root.join("lib").join("fib.metta"), FIB).unwrap();
        fs::write(root.join("README.md"), "# Fib\n\nComputes Fibonacci numbers.").unwrap();
        fs::write(root.join("notes.txt"), "ignored").unwrap();

        let db_arc = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
        let embedder = MockEmbedder::default();
        let mut indexer = Indexer::new(db_arc.clone(), &embedder, 1500);

        let first = indexer.index_repository(root, "P", "R", false).await.unwrap();
        assert_eq!(first.files_indexed, 2);
        assert_eq!(first.files_failed, 0);
        assert_eq!(first.chunks_added, 2);

        // Same content again: every chunk id already exists
        let second = indexer.index_repository(root, "P", "R", false).await.unwrap();
        assert_eq!(second.chunks_added, 0);
        assert_eq!(second.chunks_skipped, 2);

        let replaced = indexer.index_repository(root, "P", "R", true).await.unwrap();
        assert_eq!(replaced.chunks_added, 2);

        let db = db_arc.lock().await;
        let file = vec!["lib".to_string(), "fib.metta".to_string()];
        let code = db
            .find_in_scope(&crate::db::models::ScopeFilter {
                source: ChunkSource::Code,
                project: Some("P"),
                repo: Some("R"),
                section: &[],
                file: &file,
            })
            .unwrap();
        assert_eq!(code.len(), 1);
        assert!(code[0].content.starts_with("; Fibonacci"));
        assert_eq!(code[0].chunk_id, chunk_id("P", "R", &file, 0, &code[0].content));
    }

    #[tokio::test]
    async fn test_index_missing_directory() {
        let db_arc = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
        let embedder = MockEmbedder::default();
        let mut indexer = Indexer::new(db_arc, &embedder, 1500);
        assert!(
            indexer
                .index_repository("/definitely/not/here", "P", "R", false)
                .await
                .is_err()
        );
    }
}
