//! AST-based chunking of MeTTa source files.
//!
//! Top-level forms that define or declare the same name are kept together
//! (all `(= (fib ...) ...)` clauses plus `(: fib ...)`), then groups are
//! packed greedily up to the size limit. A chunk's text starts where the
//! previous chunk ended so comments stay with the forms below them.
use tracing::warn;

use super::functions::rule_name;
use super::markdown::split_into_chunks;
use super::syntax::{self, NodeKind, SyntaxNode};

#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub content: String,
    pub position: usize,
    /// Names defined or declared in this chunk, in source order.
    pub symbols: Vec<String>,
}

struct FormGroup {
    key: Option<String>,
    end: usize,
    /// A bare `!` still waiting for the expression it executes.
    open_bang: bool,
}

/// Name a top-level form is "about": rule definitions and `(: name type)`
/// declarations.
fn form_key(node: &SyntaxNode) -> Option<String> {
    if let Some(name) = rule_name(node) {
        return Some(name.to_string());
    }
    if node.kind == NodeKind::CallGroup && node.head_word() == Some(":") {
        return node.children.get(1).and_then(SyntaxNode::word).map(str::to_string);
    }
    None
}

fn group_forms(forest: &[SyntaxNode]) -> Vec<FormGroup> {
    let mut groups: Vec<FormGroup> = Vec::new();
    for node in forest {
        let key = form_key(node);
        if let Some(last) = groups.last_mut() {
            if last.open_bang && last.end == node.start {
                last.end = node.end;
                last.open_bang = false;
                continue;
            }
            if key.is_some() && last.key == key {
                last.end = node.end;
                continue;
            }
        }
        groups.push(FormGroup {
            key,
            end: node.end,
            open_bang: node.word() == Some("!"),
        });
    }
    groups
}

/// Split a MeTTa source file into code chunks of at most `max_chunk_size`
/// characters. A single group larger than the limit becomes its own chunk.
pub fn chunk_source(source: &str, max_chunk_size: usize) -> Vec<CodeChunk> {
    let forest = match syntax::parse(source) {
        Ok(forest) => forest,
        Err(e) => {
            warn!("Falling back to paragraph chunking: {e}");
            return split_into_chunks(source, max_chunk_size)
                .into_iter()
                .enumerate()
                .map(|(position, content)| CodeChunk {
                    content,
                    position,
                    symbols: Vec::new(),
                })
                .collect();
        }
    };

    let groups = group_forms(&forest);
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_end = 0;
    let mut symbols: Vec<String> = Vec::new();

    for group in &groups {
        let candidate = source[chunk_start..group.end].trim();
        if chunk_end > chunk_start && candidate.chars().count() > max_chunk_size {
            push_chunk(&mut chunks, &source[chunk_start..chunk_end], &mut symbols);
            chunk_start = chunk_end;
        }
        chunk_end = group.end;
        if let Some(key) = &group.key {
            if !symbols.contains(key) {
                symbols.push(key.clone());
            }
        }
    }

    // Trailing comments belong to the last chunk
    if chunk_end > chunk_start || !source[chunk_start..].trim().is_empty() {
        push_chunk(&mut chunks, &source[chunk_start..], &mut symbols);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<CodeChunk>, text: &str, symbols: &mut Vec<String>) {
    let content = text.trim();
    if content.is_empty() {
        symbols.clear();
        return;
    }
    chunks.push(CodeChunk {
        content: content.to_string(),
        position: chunks.len(),
        symbols: std::mem::take(symbols),
    });
}
