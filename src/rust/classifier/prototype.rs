use std::sync::Arc;
use ort::session::Session;
use tokenizers::Tokenizer;
use ndarray::{Array1, Array2};

use super::error::ClassifierError;
use super::embedding::TextEmbedding;
use super::utils::{softmax, uniform};
use super::{ModelCharacteristics, TextClassifier};

/// A thread-safe classifier that compares sentence embeddings against class prototypes.
///
/// Each class prototype is the normalized mean embedding of the class examples.
/// Probabilities are the softmax of the cosine similarities divided by a temperature.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use lime_dashboard::{ClassDefinition, PrototypeClassifier, TextClassifier};
///
/// let classifier = PrototypeClassifier::builder()
///     .with_model_files("models/minilm/model.onnx", "models/minilm/tokenizer.json", None)?
///     .add_class(
///         ClassDefinition::new("positive", "Content with positive sentiment")
///             .with_examples(vec!["great", "awesome", "excellent"])
///     )?
///     .add_class(
///         ClassDefinition::new("negative", "Content with negative sentiment")
///             .with_examples(vec!["bad", "terrible", "awful"])
///     )?
///     .build()?;
///
/// let probs = classifier.predict_proba(&["This is a great movie!".to_string()])?;
/// assert_eq!(probs.ncols(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PrototypeClassifier {
    pub tokenizer: Arc<Tokenizer>,
    pub session: Arc<Session>,
    pub labels: Arc<Vec<String>>,
    pub prototypes: Arc<Vec<Array1<f32>>>,
    pub model_characteristics: ModelCharacteristics,
    pub temperature: f32,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<PrototypeClassifier>();
    }
};

impl TextEmbedding for PrototypeClassifier {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        Some(&self.tokenizer)
    }

    fn session(&self) -> Option<&Session> {
        Some(&self.session)
    }

    fn max_sequence_length(&self) -> Option<usize> {
        Some(self.model_characteristics.max_sequence_length)
    }
}

impl PrototypeClassifier {
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    fn similarities(&self, text: &str) -> Result<Option<Array1<f32>>, ClassifierError> {
        let Some(input_vector) = self.embed_text(text)? else {
            return Ok(None);
        };
        Ok(Some(self.prototypes.iter().map(|p| input_vector.dot(p)).collect()))
    }
}

impl TextClassifier for PrototypeClassifier {
    fn class_names(&self) -> Vec<String> {
        self.labels.as_ref().clone()
    }

    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        let num_classes = self.labels.len();
        let mut probs = Array2::zeros((texts.len(), num_classes));
        for (row, text) in texts.iter().enumerate() {
            // Perturbed texts can lose every word; they carry no evidence.
            let distribution = match self.similarities(text)? {
                Some(similarities) => softmax(similarities.view(), self.temperature),
                None => uniform(num_classes),
            };
            probs.row_mut(row).assign(&distribution);
        }
        Ok(probs)
    }
}
