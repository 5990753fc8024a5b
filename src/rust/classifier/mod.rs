//! Text classifier backends that can be explained.
//!
//! Every backend implements [`TextClassifier`], which maps a batch of texts to a
//! matrix of class probabilities. The explainer only ever talks to that trait.

use std::sync::Arc;

use ndarray::Array2;

mod error;
mod embedding;
mod utils;
pub mod builder;
pub mod fasttext;
pub mod prototype;

pub use error::ClassifierError;
pub use builder::{ClassifierBuilder, ClassDefinition};
pub use fasttext::FastTextClassifier;
pub use prototype::PrototypeClassifier;

/// A classifier that returns a probability for each of its classes.
///
/// Implementations must be deterministic and thread-safe: the dashboard shares
/// one instance per registry entry between concurrent requests.
pub trait TextClassifier: Send + Sync {
    /// Class names in the column order of [`TextClassifier::predict_proba`].
    fn class_names(&self) -> Vec<String>;

    /// Returns a `texts.len() x class_names().len()` matrix of probabilities.
    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError>;
}

impl<T: TextClassifier + ?Sized> TextClassifier for Arc<T> {
    fn class_names(&self) -> Vec<String> {
        (**self).class_names()
    }

    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        (**self).predict_proba(texts)
    }
}

/// Shape information for an embedding model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCharacteristics {
    /// Length of the embedding vector produced by the model
    pub embedding_size: usize,
    /// Maximum number of tokens accepted in one input
    pub max_sequence_length: usize,
}
