use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use ort::session::Session;
use ndarray::Array1;
use log::{info, error};

use super::error::ClassifierError;
use super::embedding::TextEmbedding;
use super::prototype::PrototypeClassifier;
use super::utils::{normalize_vector, average_vectors};
use super::ModelCharacteristics;
use crate::runtime::{RuntimeConfig, create_session_builder};

const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 256;
const DEFAULT_TEMPERATURE: f32 = 0.1;
const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_CLASSES: usize = 100;

/// Represents a class definition with required label, description and examples
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    /// The unique identifier for the class
    pub label: String,
    /// What this class represents
    pub description: String,
    /// Example texts whose mean embedding becomes the class prototype.
    pub examples: Option<Vec<String>>,
}

impl ClassDefinition {
    /// Creates a new class definition with required label and description
    ///
    /// # Example
    /// ```
    /// use lime_dashboard::ClassDefinition;
    ///
    /// let class = ClassDefinition::new("positive", "Content with positive sentiment");
    /// assert!(class.examples.is_none());
    /// ```
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            examples: None,
        }
    }

    /// Adds examples to the class definition
    pub fn with_examples(mut self, examples: Vec<impl Into<String>>) -> Self {
        self.examples = Some(examples.into_iter().map(Into::into).collect());
        self
    }
}

/// A builder for constructing a [`PrototypeClassifier`] with a fluent interface.
#[derive(Default, Debug)]
pub struct ClassifierBuilder {
    model_path: Option<String>,
    tokenizer_path: Option<String>,
    tokenizer: Option<Tokenizer>,
    session: Option<Session>,
    class_examples: Vec<(String, Vec<String>)>,
    class_descriptions: HashMap<String, String>,
    model_characteristics: Option<ModelCharacteristics>,
    runtime_config: RuntimeConfig,
    temperature: Option<f32>,
}

impl TextEmbedding for ClassifierBuilder {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        self.tokenizer.as_ref()
    }

    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn max_sequence_length(&self) -> Option<usize> {
        self.model_characteristics.as_ref().map(|c| c.max_sequence_length)
    }
}

impl ClassifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration for ONNX model execution.
    /// Must be called before [`ClassifierBuilder::with_model_files`] to take effect.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Sets the softmax temperature applied to cosine similarities.
    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, ClassifierError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(ClassifierError::ValidationError(
                format!("Temperature must be a positive number, got {}", temperature)
            ));
        }
        self.temperature = Some(temperature);
        Ok(self)
    }

    /// Loads an ONNX embedding model and its tokenizer.
    ///
    /// `max_sequence_length` defaults to 256 tokens.
    ///
    /// # Errors
    /// - The paths are empty, already set, or do not exist
    /// - The model or tokenizer fails to load
    /// - The model does not have the expected inputs and outputs
    pub fn with_model_files(
        mut self,
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        max_sequence_length: Option<usize>,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();
        if model_path.as_os_str().is_empty() || tokenizer_path.as_os_str().is_empty() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths cannot be empty".to_string()));
        }
        if self.model_path.is_some() || self.tokenizer_path.is_some() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths already set".to_string()));
        }
        if !model_path.exists() {
            return Err(ClassifierError::BuildError(format!("Model file not found: {}", model_path.display())));
        }
        if !tokenizer_path.exists() {
            return Err(ClassifierError::BuildError(format!("Tokenizer file not found: {}", tokenizer_path.display())));
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| {
                error!("Failed to load tokenizer: {}", e);
                ClassifierError::BuildError(format!("Failed to load tokenizer: {}", e))
            })?;
        info!("Tokenizer loaded from {}", tokenizer_path.display());

        let session = create_session_builder(&self.runtime_config)?
            .commit_from_file(model_path)?;
        Self::validate_model(&session)?;
        info!("Model structure validated for {}", model_path.display());

        self.tokenizer = Some(tokenizer);
        self.session = Some(session);
        self.model_characteristics = Some(ModelCharacteristics {
            embedding_size: 0,
            max_sequence_length: max_sequence_length.unwrap_or(DEFAULT_MAX_SEQUENCE_LENGTH),
        });

        // Infer the embedding size from a sample input
        let embedding = self.embed_text("Test input to infer embedding size")?
            .ok_or_else(|| ClassifierError::BuildError("Tokenizer produced no tokens for the sample input".into()))?;
        info!("Inferred embedding size from model: {}", embedding.len());
        if let Some(characteristics) = self.model_characteristics.as_mut() {
            characteristics.embedding_size = embedding.len();
        }

        self.model_path = Some(model_path.to_string_lossy().to_string());
        self.tokenizer_path = Some(tokenizer_path.to_string_lossy().to_string());
        Ok(self)
    }

    /// Validates class data:
    /// - Label must not be empty
    /// - Description must not be empty and must not exceed 1000 characters
    /// - Must have at least one example, and no example can be empty
    fn validate_class_data(
        label: &str,
        description: &str,
        examples: &[impl AsRef<str>]
    ) -> Result<(), ClassifierError> {
        if label.is_empty() {
            return Err(ClassifierError::ValidationError("Class label cannot be empty".into()));
        }
        if description.is_empty() {
            return Err(ClassifierError::ValidationError("Class description cannot be empty".into()));
        }
        if description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(ClassifierError::ValidationError(
                format!("Class description is too long ({} chars, max is {})",
                    description.len(), MAX_DESCRIPTION_LENGTH)
            ));
        }
        if examples.is_empty() {
            return Err(ClassifierError::ValidationError(
                format!("Class '{}' must have at least one example", label)
            ));
        }
        if let Some(pos) = examples.iter().position(|e| e.as_ref().trim().is_empty()) {
            return Err(ClassifierError::ValidationError(
                format!("Example {} cannot be empty", pos + 1)
            ));
        }
        Ok(())
    }

    /// Adds a class. Classes keep their insertion order as prediction columns.
    ///
    /// # Example
    /// ```
    /// use lime_dashboard::{ClassifierBuilder, ClassDefinition};
    ///
    /// let builder = ClassifierBuilder::new()
    ///     .add_class(
    ///         ClassDefinition::new("positive", "Positive sentiment")
    ///             .with_examples(vec!["great", "wonderful"])
    ///     );
    /// assert!(builder.is_ok());
    /// ```
    pub fn add_class(mut self, class: ClassDefinition) -> Result<Self, ClassifierError> {
        let examples = class.examples.unwrap_or_default();

        Self::validate_class_data(&class.label, &class.description, &examples)?;

        if self.class_descriptions.contains_key(&class.label) {
            return Err(ClassifierError::ValidationError(
                format!("Class '{}' is already defined", class.label)
            ));
        }
        if self.class_examples.len() >= MAX_CLASSES {
            return Err(ClassifierError::ValidationError(
                format!("Maximum number of classes ({}) exceeded", MAX_CLASSES)
            ));
        }

        self.class_examples.push((class.label.clone(), examples));
        self.class_descriptions.insert(class.label, class.description);
        Ok(self)
    }

    /// Embeds every example and builds the classifier.
    pub fn build(mut self) -> Result<PrototypeClassifier, ClassifierError> {
        if self.model_path.is_none() || self.tokenizer_path.is_none() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths must be set".to_string()));
        }
        if self.class_examples.is_empty() {
            return Err(ClassifierError::BuildError("At least one class must be added".to_string()));
        }

        let model_characteristics = self.model_characteristics
            .clone()
            .ok_or_else(|| ClassifierError::BuildError("Model characteristics not set".to_string()))?;

        let mut labels = Vec::with_capacity(self.class_examples.len());
        let mut prototypes = Vec::with_capacity(self.class_examples.len());
        for (label, examples) in &self.class_examples {
            info!("Embedding {} examples for class '{}'", examples.len(), label);

            let embedded_examples: Vec<Array1<f32>> = examples.iter()
                .enumerate()
                .filter_map(|(i, text)| {
                    match self.embed_text(text) {
                        Ok(embedding) => embedding,
                        Err(e) => {
                            error!("Failed to embed example {} for class '{}': {}", i + 1, label, e);
                            None
                        }
                    }
                })
                .collect();

            if embedded_examples.is_empty() {
                return Err(ClassifierError::BuildError(
                    format!("No valid embeddings generated for class '{}'", label)
                ));
            }

            let avg_vector = average_vectors(&embedded_examples, model_characteristics.embedding_size);
            labels.push(label.clone());
            prototypes.push(normalize_vector(&avg_vector));
        }

        let tokenizer = Arc::new(self.tokenizer.take()
            .ok_or_else(|| ClassifierError::BuildError("No tokenizer loaded".into()))?);
        let session = Arc::new(self.session.take()
            .ok_or_else(|| ClassifierError::BuildError("No ONNX model loaded".into()))?);

        Ok(PrototypeClassifier {
            tokenizer,
            session,
            labels: Arc::new(labels),
            prototypes: Arc::new(prototypes),
            model_characteristics,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        })
    }

    /// Checks that the model has `input_ids`/`attention_mask` style inputs and an output.
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        let inputs = &session.inputs;
        if inputs.len() < 2 {
            return Err(ClassifierError::ModelError(
                format!("Model must have at least 2 inputs (input_ids and attention_mask), found {}", inputs.len())
            ));
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for embeddings".to_string()
            ));
        }
        Ok(())
    }
}
