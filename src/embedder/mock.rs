use super::{Embedder, EmbedderError};
use crate::db::EMBEDDING_DIMENSIONS;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Deterministic embedder for tests: signed feature hashing over lowercase
/// word tokens, L2-normalised. Punctuation-only tokens such as `=` or `+` are
/// dropped.
///
/// Needs no model files, and texts sharing identifiers land close together,
/// so retrieval tests can predict their top hits.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSIONS)
    }
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | ',' | '.'))
            .map(|t| t.trim_start_matches('$').to_lowercase())
            .filter(|t| t.chars().any(char::is_alphanumeric))
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if self.dimensions == 0 {
            return Err(EmbedderError::InferenceFailed(
                "embedding dimension must be non-zero".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in Self::tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            // cosine distance is undefined on the zero vector
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_dimensions_and_norm() {
        let embedder = MockEmbedder::default();
        let v = embedder.embed("(= (fib $n) (+ (fib (- $n 1)) (fib (- $n 2))))").unwrap();
        assert_eq!(v.len(), 384);
        assert_eq!(embedder.dimensions(), 384);
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_deterministic() {
        let embedder = MockEmbedder::default();
        assert_eq!(
            embedder.embed("fibonacci numbers").unwrap(),
            embedder.embed("Fibonacci   numbers").unwrap()
        );
    }

    #[test]
    fn test_shared_tokens_are_closer() {
        let embedder = MockEmbedder::default();
        let query = embedder.embed("fib").unwrap();
        let fib = embedder.embed("(= (fib $n) (fib $n))").unwrap();
        let other = embedder.embed("(= (greet $name) (hello $name))").unwrap();
        assert!(cosine(&query, &fib) > cosine(&query, &other));
    }

    #[test]
    fn test_empty_text_is_not_zero() {
        let v = MockEmbedder::default().embed("   ").unwrap();
        assert_eq!(v[0], 1.0);
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = MockEmbedder::new(16);
        let batch = embedder.embed_batch(&["a b", "c"]).unwrap();
        assert_eq!(batch, vec![embedder.embed("a b").unwrap(), embedder.embed("c").unwrap()]);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(MockEmbedder::new(0).embed("x").is_err());
    }
}
