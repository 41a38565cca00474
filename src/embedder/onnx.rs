/// ONNX Runtime embedder using the `ort` crate.
///
/// Runs a sentence-transformers model (all-MiniLM-L6-v2 by default) over
/// padded batches, mean-pools the last hidden state under the attention mask
/// and L2-normalizes the result.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{SentenceTokenizer, TokenizerOutput};
use super::{Embedder, EmbedderError};

/// Texts per inference call; bounds the padded tensor size during ingestion.
const MAX_BATCH: usize = 32;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: SentenceTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    ///
    /// `dimensions` is the model's hidden size; every output row is checked
    /// against it.
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = SentenceTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer error: {e}")))?;

        info!(
            "Loaded ONNX model from {} (vocab size: {})",
            model_dir.display(),
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    /// One inference call over a batch of equal-length rows.
    fn run_batch(&self, rows: &[TokenizerOutput]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = rows.len();
        let seq_len = rows.first().map_or(0, |r| r.input_ids.len());
        if rows.iter().any(|r| r.input_ids.len() != seq_len) {
            return Err(EmbedderError::InferenceFailed(
                "tokenized rows differ in length".to_string(),
            ));
        }

        let input_ids: Vec<i64> = rows.iter().flat_map(|r| r.input_ids.iter().copied()).collect();
        let attention_mask: Vec<i64> = rows
            .iter()
            .flat_map(|r| r.attention_mask.iter().copied())
            .collect();

        // (shape, data) tuples avoid coupling to ort's ndarray version
        let input_ids_val = Tensor::from_array(([batch, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([batch, seq_len], attention_mask))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array(([batch, seq_len], vec![0i64; batch * seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [batch, seq_len, hidden]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let row_len = seq_len * self.dimensions;
        if hidden_data.len() != batch * row_len {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {} hidden values, model returned {}",
                batch * row_len,
                hidden_data.len()
            )));
        }

        Ok(rows
            .iter()
            .zip(hidden_data.chunks_exact(row_len.max(1)))
            .map(|(row, hidden)| {
                l2_normalize(&mean_pooling(
                    hidden,
                    &row.attention_mask,
                    seq_len,
                    self.dimensions,
                ))
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(MAX_BATCH) {
            let rows = self
                .tokenizer
                .tokenize_batch(group)
                .map_err(|e| EmbedderError::InferenceFailed(format!("tokenization failed: {e}")))?;
            vectors.extend(self.run_batch(&rows)?);
        }
        debug!("Embedded {} text(s)", vectors.len());
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean of the hidden states of real tokens.
///
/// `hidden_data` is one row of shape `[seq_len, hidden_size]`, flattened.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for (t, &mask) in attention_mask.iter().enumerate().take(seq_len) {
        if mask == 0 {
            continue;
        }
        mask_sum += 1.0;
        let token = &hidden_data[t * hidden_size..(t + 1) * hidden_size];
        for (acc, value) in result.iter_mut().zip(token) {
            *acc += value;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_DIR: &str = "models/all-MiniLM-L6-v2";

    #[test]
    fn test_l2_normalize() {
        let normed = l2_normalize(&[3.0, 4.0]);
        assert!((normed[0] - 0.6).abs() < 1e-6);
        assert!((normed[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pooling_skips_padding() {
        // 3 tokens, hidden_size=2, last token is padding
        let hidden = vec![1.0, 2.0, 3.0, 6.0, 100.0, 100.0];
        let result = mean_pooling(&hidden, &[1, 1, 0], 3, 2);
        assert_eq!(result, vec![2.0, 4.0]);
    }

    #[test]
    fn test_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxEmbedder::new(dir.path(), 384).err().unwrap();
        assert!(matches!(err, EmbedderError::ModelLoadFailed(_)));
    }

    /// Requires downloaded model files and an ONNX Runtime library.
    #[test]
    #[ignore]
    fn test_onnx_embed_batch() {
        let model_dir = Path::new(MODEL_DIR);
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder = OnnxEmbedder::new(model_dir, 384).unwrap();
        let texts = ["(= (fib $n) (+ (fib (- $n 1)) (fib (- $n 2))))", "fibonacci"];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 2);

        for vec in &batch {
            assert_eq!(vec.len(), 384);
            let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.01, "expected unit vector, got norm={norm}");
        }

        // Padding in the batch does not change the shorter text's vector
        let single = embedder.embed(texts[1]).unwrap();
        let dot: f32 = single.iter().zip(&batch[1]).map(|(a, b)| a * b).sum();
        assert!(dot > 0.999);
    }
}
