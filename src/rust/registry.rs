//! Named classifiers offered by the dashboard.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classifier::{ClassDefinition, ClassifierError, FastTextClassifier, PrototypeClassifier, TextClassifier};
use crate::config::{BackendKind, ClassifierConfig, DashboardConfig};
use crate::model_manager::{ModelError, ModelManager};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("classifier key '{0}' is registered twice")]
    DuplicateKey(String),
    #[error("classifier key cannot be empty")]
    EmptyKey,
    #[error("failed to load classifier '{key}': {source}")]
    Load {
        key: String,
        source: ClassifierError,
    },
    #[error("model files for classifier '{key}' are unavailable: {source}")]
    Model {
        key: String,
        source: ModelError,
    },
    #[error("classifier '{0}' is missing a tokenizer file")]
    MissingTokenizer(String),
}

/// One selectable entry of the classifier dropdown.
#[derive(Clone)]
pub struct RegisteredClassifier {
    pub key: String,
    pub name: String,
    pub model_path: PathBuf,
    pub classifier: Arc<dyn TextClassifier>,
}

impl std::fmt::Debug for RegisteredClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredClassifier")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

/// Classifiers in the order they were registered.
#[derive(Debug, Clone, Default)]
pub struct ClassifierRegistry {
    entries: Vec<RegisteredClassifier>,
    index: HashMap<String, usize>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        name: impl Into<String>,
        model_path: impl Into<PathBuf>,
        classifier: Arc<dyn TextClassifier>,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(RegistryError::EmptyKey);
        }
        if self.index.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(RegisteredClassifier {
            key,
            name: name.into(),
            model_path: model_path.into(),
            classifier,
        });
        Ok(())
    }

    /// Builder-style [`ClassifierRegistry::register`].
    pub fn with_classifier(
        mut self,
        key: impl Into<String>,
        name: impl Into<String>,
        classifier: Arc<dyn TextClassifier>,
    ) -> Result<Self, RegistryError> {
        self.register(key, name, PathBuf::new(), classifier)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&RegisteredClassifier> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredClassifier> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Downloads model and tokenizer files that are missing and have a configured URL.
    pub async fn fetch_missing(config: &DashboardConfig, manager: &ModelManager) -> Result<(), RegistryError> {
        for entry in &config.classifiers {
            let model_err = |source: ModelError| RegistryError::Model { key: entry.key.clone(), source };
            match entry.source() {
                Some(source) => {
                    manager.ensure_file(&entry.file, Some(&source)).await.map_err(model_err)?;
                }
                None => log::debug!("Classifier '{}' has no download URL", entry.key),
            }
            if let (Some(tokenizer), Some(source)) = (&entry.tokenizer, entry.tokenizer_source()) {
                manager.ensure_file(tokenizer, Some(&source)).await.map_err(model_err)?;
            }
        }
        Ok(())
    }

    /// Loads every configured classifier. Any failure aborts loading.
    pub fn load(config: &DashboardConfig, manager: &ModelManager) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for entry in &config.classifiers {
            let model_path = manager.resolve(&entry.file);
            if !model_path.is_file() {
                return Err(RegistryError::Model {
                    key: entry.key.clone(),
                    source: ModelError::NotFound(model_path),
                });
            }
            let classifier = load_classifier(entry, manager)?;
            log::info!(
                "Registered classifier '{}' ({}) from {:?} with classes {:?}",
                entry.key, entry.name, model_path, classifier.class_names()
            );
            registry.register(entry.key.clone(), entry.name.clone(), model_path, classifier)?;
        }
        Ok(registry)
    }
}

fn load_classifier(entry: &ClassifierConfig, manager: &ModelManager) -> Result<Arc<dyn TextClassifier>, RegistryError> {
    let load_err = |source: ClassifierError| RegistryError::Load { key: entry.key.clone(), source };
    let model_path = manager.resolve(&entry.file);
    match entry.kind {
        BackendKind::Fasttext => {
            let classifier = FastTextClassifier::from_file(&model_path).map_err(load_err)?;
            Ok(Arc::new(classifier))
        }
        BackendKind::Prototype => {
            let tokenizer = entry.tokenizer.as_ref()
                .ok_or_else(|| RegistryError::MissingTokenizer(entry.key.clone()))?;
            let mut builder = PrototypeClassifier::builder()
                .with_model_files(&model_path, manager.resolve(tokenizer), entry.max_sequence_length)
                .map_err(load_err)?;
            if let Some(temperature) = entry.temperature {
                builder = builder.with_temperature(temperature).map_err(load_err)?;
            }
            for class in &entry.classes {
                let definition = ClassDefinition::new(&class.label, &class.description)
                    .with_examples(class.examples.clone());
                builder = builder.add_class(definition).map_err(load_err)?;
            }
            Ok(Arc::new(builder.build().map_err(load_err)?))
        }
    }
}
