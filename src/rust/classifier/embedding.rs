use tokenizers::Tokenizer;
use ort::session::Session;
use ndarray::{Array1, Array2};
use ort::value::Tensor;
use std::collections::HashMap;

use super::error::ClassifierError;
use super::utils::normalize_vector;

/// Turns text into normalized sentence embeddings with an ONNX model.
///
/// The model is expected to:
/// - Accept `input_ids` and `attention_mask` (both `[batch_size, sequence_length]`)
/// - Output `[batch_size, sequence_length, embedding_size]`
///
/// The first token's vector is used as the sentence embedding.
pub(crate) trait TextEmbedding {
    fn tokenizer(&self) -> Option<&Tokenizer>;

    fn session(&self) -> Option<&Session>;

    fn max_sequence_length(&self) -> Option<usize>;

    /// Encodes text into token IDs, rejecting inputs longer than the model allows.
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ClassifierError> {
        let tokenizer = self.tokenizer()
            .ok_or_else(|| ClassifierError::TokenizerError("Tokenizer not initialized".into()))?;
        let max_length = self.max_sequence_length()
            .ok_or_else(|| ClassifierError::TokenizerError("Max sequence length not set".into()))?;

        let encoding = tokenizer.encode(text, false)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;
        let token_ids = encoding.get_ids();

        if token_ids.len() > max_length {
            return Err(ClassifierError::ValidationError(
                format!(
                    "Input text too long: {} tokens (max: {}). Consider splitting the text into smaller chunks.",
                    token_ids.len(), max_length
                )
            ));
        }

        Ok(token_ids.to_vec())
    }

    /// Returns `None` when the text produces no tokens at all.
    fn embed_text(&self, text: &str) -> Result<Option<Array1<f32>>, ClassifierError> {
        let tokens = self.tokenize(text)?;
        if tokens.is_empty() {
            return Ok(None);
        }
        self.get_embedding(&tokens).map(Some)
    }

    fn get_embedding(&self, tokens: &[u32]) -> Result<Array1<f32>, ClassifierError> {
        let session = self.session()
            .ok_or_else(|| ClassifierError::ModelError("Session not initialized".into()))?;

        let input_ids = Array2::from_shape_vec((1, tokens.len()),
            tokens.iter().map(|&x| x as i64).collect())
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input array: {}", e)))?;
        let attention_mask = Array2::from_shape_vec((1, tokens.len()),
            tokens.iter().map(|&x| if x == 0 { 0i64 } else { 1i64 }).collect())
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask array: {}", e)))?;

        let mut input_tensors = HashMap::new();
        input_tensors.insert("input_ids", Tensor::from_array(input_ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?);
        input_tensors.insert("attention_mask", Tensor::from_array(attention_mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask tensor: {}", e)))?);

        let outputs = session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        if output_tensor.ndim() != 3 {
            return Err(ClassifierError::ModelError(format!(
                "Expected a 3-dimensional output, got shape {:?}", output_tensor.shape()
            )));
        }
        let embedding_slice = output_tensor.slice(ndarray::s![0, 0, ..]);
        let embedding = Array1::from_iter(embedding_slice.iter().cloned());

        Ok(normalize_vector(&embedding))
    }
}
