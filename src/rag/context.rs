use serde::Serialize;

use super::retriever::RetrievedContext;
use super::{Document, DocumentMetadata};
use crate::db::models::ChunkSource;

/// One retrieved document as reported back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct Source<'a> {
    pub category: ChunkSource,
    pub text: &'a str,
    pub metadata: &'a DocumentMetadata,
    pub score: Option<f64>,
}

/// Renders the prompt context: a `=== CATEGORY ===` header per non-empty
/// category, then one `- text` line per document.
pub fn assemble_context(context: &RetrievedContext) -> String {
    let mut sections = Vec::new();
    for (category, docs) in context {
        if docs.is_empty() {
            continue;
        }
        let mut section = format!("=== {} ===", category.as_str().to_uppercase());
        for doc in docs {
            section.push_str("\n- ");
            section.push_str(&doc.text);
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

pub fn format_sources(context: &RetrievedContext) -> Vec<Source<'_>> {
    context
        .iter()
        .flat_map(|(category, docs)| {
            docs.iter().map(move |doc: &Document| Source {
                category: *category,
                text: &doc.text,
                metadata: &doc.metadata,
                score: doc.metadata.score,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::StoredChunk;

    fn doc(id: &str, text: &str, source: ChunkSource) -> Document {
        Document::from_chunk(StoredChunk {
            seq: 0,
            chunk_id: id.to_string(),
            content: text.to_string(),
            source,
            project: None,
            repo: None,
            section: vec![],
            file: vec![],
            version: None,
            functions: None,
        })
    }

    fn sample() -> RetrievedContext {
        let mut context = RetrievedContext::new();
        context.insert(
            ChunkSource::Documentation,
            vec![doc("d", "Fibonacci docs", ChunkSource::Documentation)],
        );
        context.insert(
            ChunkSource::Code,
            vec![
                doc("a", "(= (fib 0) 0)", ChunkSource::Code),
                doc("b", "(= (main) (fib 5))", ChunkSource::Code),
            ],
        );
        context.insert(ChunkSource::Others, vec![]);
        context
    }

    #[test]
    fn test_assemble_context() {
        assert_eq!(
            assemble_context(&sample()),
            "=== CODE ===\n- (= (fib 0) 0)\n- (= (main) (fib 5))\n\n=== DOCUMENTATION ===\n- Fibonacci docs"
        );
        assert_eq!(assemble_context(&RetrievedContext::new()), "");
    }

    #[test]
    fn test_format_sources() {
        let context = sample();
        let sources = format_sources(&context);
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].category, ChunkSource::Code);
        assert_eq!(sources[2].text, "Fibonacci docs");

        let json = serde_json::to_value(&sources[0]).unwrap();
        assert_eq!(json["category"], "code");
        assert_eq!(json["metadata"]["chunkId"], "a");
        assert!(json["score"].is_null());
    }
}
