//! S-expression parser for MeTTa source.
//!
//! Produces a forest of [`SyntaxNode`]s. Groups are classified by position and
//! heading token so later passes can tell definitions from applications
//! without re-reading the source:
//!
//! - a top-level `(= head body)` is a [`NodeKind::RuleGroup`],
//! - the head of a rule is always an [`NodeKind::ExpressionGroup`],
//! - any other group headed by a non-variable word is a [`NodeKind::CallGroup`],
//! - everything else is an [`NodeKind::ExpressionGroup`].
//!
//! The tokenizer, the tree builder and node teardown are all iterative, so
//! arbitrarily deep nesting cannot blow the stack. Groups keep only their
//! byte span; [`SyntaxNode::source_text`] slices it back out of the source.
use thiserror::Error;

/// Prefix marking a pattern variable (`$x`).
pub const VARIABLE_SIGIL: char = '$';

/// Head token of an equality rule.
pub const RULE_HEAD: &str = "=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    WordToken,
    Literal,
    ExpressionGroup,
    CallGroup,
    RuleGroup,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::WordToken => "word",
            NodeKind::Literal => "literal",
            NodeKind::ExpressionGroup => "expression",
            NodeKind::CallGroup => "call",
            NodeKind::RuleGroup => "rule",
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self,
            NodeKind::ExpressionGroup | NodeKind::CallGroup | NodeKind::RuleGroup
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Token text for words and literals. Empty for groups.
    pub text: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    fn leaf(kind: NodeKind, source: &str, start: usize, end: usize) -> Self {
        Self {
            kind,
            text: source[start..end].to_string(),
            start,
            end,
            children: Vec::new(),
        }
    }

    fn group(kind: NodeKind, start: usize, end: usize, children: Vec<SyntaxNode>) -> Self {
        Self {
            kind,
            text: String::new(),
            start,
            end,
            children,
        }
    }

    /// Source slice covered by this node.
    pub fn source_text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }

    /// Whether this is a `$`-prefixed variable token.
    pub fn is_variable(&self) -> bool {
        self.kind == NodeKind::WordToken && self.text.starts_with(VARIABLE_SIGIL)
    }

    /// Word text if this node is a non-variable word.
    pub fn word(&self) -> Option<&str> {
        if self.kind == NodeKind::WordToken && !self.is_variable() {
            Some(&self.text)
        } else {
            None
        }
    }

    /// The head word of a group: its first child, when that child is a
    /// non-variable word.
    pub fn head_word(&self) -> Option<&str> {
        self.children.first().and_then(SyntaxNode::word)
    }
}

impl Drop for SyntaxNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected ')' at byte {0}")]
    UnexpectedClose(usize),

    #[error("unclosed '(' opened at byte {0}")]
    Unclosed(usize),

    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open(usize),
    Close(usize),
    Atom {
        start: usize,
        end: usize,
        literal: bool,
    },
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';')
}

/// Numbers are literals; `inf`/`nan` style words are not.
fn is_number(text: &str) -> bool {
    let digits = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);
    let starts_numeric = digits
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '.')
        .unwrap_or(false);
    starts_numeric && digits.chars().any(|c| c.is_ascii_digit()) && text.parse::<f64>().is_ok()
}

fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            ';' => {
                // Comment runs to end of line
                while let Some(&(_, next)) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' => tokens.push(Token::Open(pos)),
            ')' => tokens.push(Token::Close(pos)),
            '"' => {
                let mut end = None;
                let mut escaped = false;
                for (i, sc) in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if sc == '\\' {
                        escaped = true;
                    } else if sc == '"' {
                        end = Some(i + sc.len_utf8());
                        break;
                    }
                }
                let end = end.ok_or(ParseError::UnterminatedString(pos))?;
                tokens.push(Token::Atom {
                    start: pos,
                    end,
                    literal: true,
                });
            }
            _ => {
                let mut end = pos + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if is_delimiter(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Atom {
                    start: pos,
                    end,
                    literal: is_number(&source[pos..end]),
                });
            }
        }
    }

    Ok(tokens)
}

fn classify_group(children: &[SyntaxNode], top_level: bool) -> NodeKind {
    match children.first().and_then(SyntaxNode::word) {
        Some(RULE_HEAD) if top_level => NodeKind::RuleGroup,
        Some(_) => NodeKind::CallGroup,
        None => NodeKind::ExpressionGroup,
    }
}

struct OpenGroup {
    start: usize,
    children: Vec<SyntaxNode>,
}

/// Parse MeTTa source into a forest of top-level nodes.
pub fn parse(source: &str) -> Result<Vec<SyntaxNode>, ParseError> {
    let mut forest = Vec::new();
    let mut stack: Vec<OpenGroup> = Vec::new();

    for token in tokenize(source)? {
        match token {
            Token::Open(start) => stack.push(OpenGroup {
                start,
                children: Vec::new(),
            }),
            Token::Atom {
                start,
                end,
                literal,
            } => {
                let kind = if literal {
                    NodeKind::Literal
                } else {
                    NodeKind::WordToken
                };
                let node = SyntaxNode::leaf(kind, source, start, end);
                match stack.last_mut() {
                    Some(group) => group.children.push(node),
                    None => forest.push(node),
                }
            }
            Token::Close(pos) => {
                let OpenGroup {
                    start,
                    mut children,
                } = stack.pop().ok_or(ParseError::UnexpectedClose(pos))?;

                let kind = classify_group(&children, stack.is_empty());
                if kind == NodeKind::RuleGroup {
                    if let Some(head) = children.get_mut(1) {
                        if head.kind.is_group() {
                            head.kind = NodeKind::ExpressionGroup;
                        }
                    }
                }

                let node = SyntaxNode::group(kind, start, pos + 1, children);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => forest.push(node),
                }
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Unclosed(open.start));
    }

    Ok(forest)
}
