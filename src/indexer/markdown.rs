use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// A documentation chunk together with the heading trail it sits under.
#[derive(Debug, Clone, PartialEq)]
pub struct DocChunk {
    pub content: String,
    pub position: usize,
    pub section: Vec<String>,
}

struct Section {
    trail: Vec<String>,
    start: usize,
    end: usize,
}

/// Splits markdown into sections by heading, then each section body into
/// paragraph-bounded chunks.
pub fn chunk_markdown(content: &str, chunk_size: usize) -> Vec<DocChunk> {
    let mut sections = Vec::new();
    let mut trail: Vec<(usize, String)> = Vec::new();
    let mut body_start = 0;
    let mut heading: Option<(usize, String)> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                sections.push(Section {
                    trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                    start: body_start,
                    end: range.start,
                });
                heading = Some((level as usize, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, title)) = heading.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title)) = heading.take() {
                    trail.retain(|(l, _)| *l < level);
                    trail.push((level, title.trim().to_string()));
                }
                body_start = range.end;
            }
            _ => {}
        }
    }
    sections.push(Section {
        trail: trail.into_iter().map(|(_, t)| t).collect(),
        start: body_start,
        end: content.len(),
    });

    let mut chunks = Vec::new();
    for section in sections {
        for piece in split_into_chunks(&content[section.start..section.end], chunk_size) {
            chunks.push(DocChunk {
                content: piece,
                position: chunks.len(),
                section: section.trail.clone(),
            });
        }
    }
    chunks
}

/// Splits text into chunks of approximately `chunk_size` characters (using `char` count).
pub fn split_into_chunks(content: &str, chunk_size: usize) -> Vec<String> {
    let char_count = content.chars().count();

    if char_count <= chunk_size {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    for para in content.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let current_len = current_chunk.chars().count();
        let para_len = para.chars().count();

        if current_len > 0 && current_len + para_len + 2 > chunk_size {
            chunks.push(std::mem::take(&mut current_chunk));
        }

        if para_len > chunk_size {
            if !current_chunk.is_empty() {
                chunks.push(std::mem::take(&mut current_chunk));
            }
            chunks.extend(split_large_paragraph(para, chunk_size));
        } else {
            if !current_chunk.is_empty() {
                current_chunk.push_str("\n\n");
            }
            current_chunk.push_str(para);
        }
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

/// Splits a large paragraph into smaller chunks, preferring line or sentence boundaries.
fn split_large_paragraph(para: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut chars: Vec<char> = para.chars().collect();

    while chars.len() > chunk_size {
        let mut cut_point = chunk_size;

        // Search backwards from chunk_size to chunk_size/2 for a boundary
        for i in (chunk_size / 2..=chunk_size).rev() {
            if i < chars.len() && matches!(chars[i], '.' | '!' | '?' | '\n') {
                cut_point = i + 1;
                break;
            }
        }

        let piece: String = chars[..cut_point].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        let remaining: String = chars[cut_point..].iter().collect();
        chars = remaining.trim().chars().collect();
    }

    if !chars.is_empty() {
        chunks.push(chars.into_iter().collect());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_text() {
        let content = "Paragraph 1\n\nParagraph 2\n\nParagraph 3";
        let chunks = split_into_chunks(content, 500);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Paragraph 1"));
    }

    #[test]
    fn test_split_long_text() {
        let para = "Test paragraph. ".repeat(50);
        let content = vec![para; 10].join("\n\n");
        let chunks = split_into_chunks(&content, 500);

        assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(!chunk.is_empty(), "Chunk {} is empty", i);
            assert!(chunk.chars().count() <= 500, "Chunk {} too long", i);
        }
    }

    #[test]
    fn test_split_empty_text() {
        assert!(split_into_chunks("", 500).is_empty());
        assert!(split_into_chunks("   \n\n   \n\n   ", 500).is_empty());
    }

    #[test]
    fn test_split_large_paragraph_without_boundaries() {
        let long_para = "x".repeat(1200);
        let chunks = split_large_paragraph(&long_para, 500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
    }

    #[test]
    fn test_markdown_heading_trail() {
        let doc = "Intro text.\n\n# Guide\n\nGuide body.\n\n## Install\n\nRun `cargo install`.\n\n## Usage\n\nCall (fib 10).\n\n# Reference\n\nAll functions.";
        let chunks = chunk_markdown(doc, 500);
        let sections: Vec<(Vec<String>, String)> = chunks
            .iter()
            .map(|c| (c.section.clone(), c.content.clone()))
            .collect();

        assert_eq!(
            sections,
            vec![
                (vec![], "Intro text.".to_string()),
                (vec!["Guide".to_string()], "Guide body.".to_string()),
                (
                    vec!["Guide".to_string(), "Install".to_string()],
                    "Run `cargo install`.".to_string()
                ),
                (
                    vec!["Guide".to_string(), "Usage".to_string()],
                    "Call (fib 10).".to_string()
                ),
                (vec!["Reference".to_string()], "All functions.".to_string()),
            ]
        );
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i);
        }
    }

    #[test]
    fn test_markdown_code_span_in_heading() {
        let chunks = chunk_markdown("# The `fib` function\n\nBody.", 500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, vec!["The fib function".to_string()]);
    }
}
