//! Dashboard configuration loaded from TOML.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::explain::ExplainerConfig;
use crate::model_manager::{ModelManager, ModelSource};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which classifier implementation backs a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// fastText supervised `.bin` model
    Fasttext,
    /// ONNX sentence embeddings compared against class prototypes
    Prototype,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassConfig {
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    pub key: String,
    pub name: String,
    pub kind: BackendKind,
    /// Model file, relative to the models directory unless absolute
    pub file: PathBuf,
    #[serde(default)]
    pub tokenizer: Option<PathBuf>,
    #[serde(default)]
    pub max_sequence_length: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub classes: Vec<ClassConfig>,
    /// Download location used when the model file is missing
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    /// Download location of the tokenizer file of prototype classifiers
    #[serde(default)]
    pub tokenizer_url: Option<String>,
    #[serde(default)]
    pub tokenizer_sha256: Option<String>,
}

impl ClassifierConfig {
    pub fn source(&self) -> Option<ModelSource> {
        self.url.as_ref().map(|url| ModelSource {
            url: url.clone(),
            sha256: self.sha256.clone(),
        })
    }

    pub fn tokenizer_source(&self) -> Option<ModelSource> {
        self.tokenizer_url.as_ref().map(|url| ModelSource {
            url: url.clone(),
            sha256: self.tokenizer_sha256.clone(),
        })
    }

    fn default_fasttext() -> Self {
        Self {
            key: "fasttext".into(),
            name: "FastText".into(),
            kind: BackendKind::Fasttext,
            file: PathBuf::from("fasttext/sst5_hyperopt.bin"),
            tokenizer: None,
            max_sequence_length: None,
            temperature: None,
            classes: Vec::new(),
            url: None,
            sha256: None,
            tokenizer_url: None,
            tokenizer_sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub bind_addr: String,
    pub models_dir: Option<PathBuf>,
    pub title: String,
    pub heading: String,
    pub legend: String,
    pub default_classifier: String,
    pub default_num_samples: usize,
    pub max_num_samples: usize,
    pub explain_timeout_secs: u64,
    pub fetch_missing_models: bool,
    pub explainer: ExplainerConfig,
    pub classifiers: Vec<ClassifierConfig>,
}

/// Settings from the command line and the environment that win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub bind_addr: Option<String>,
    /// `--models-dir`
    pub models_dir: Option<PathBuf>,
    /// Cache root from the environment; models live in its `models` subdirectory
    pub cache_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8050".into(),
            models_dir: None,
            title: "LIME explainer app for classification models".into(),
            heading: "LIME Explainer Dashboard for Fine-grained Sentiment".into(),
            legend: "1: Strongly Negative 2: Weakly Negative 3: Neutral 4: Weakly Positive 5: Strongly Positive".into(),
            default_classifier: "fasttext".into(),
            default_num_samples: 5000,
            max_num_samples: 50_000,
            explain_timeout_secs: 120,
            fetch_missing_models: false,
            explainer: ExplainerConfig::default(),
            classifiers: vec![ClassifierConfig::default_fasttext()],
        }
    }
}

impl DashboardConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reads the given file, or falls back to the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Self::from_file(path)
            }
            None => {
                log::info!("No configuration file given, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classifiers.is_empty() {
            return Err(ConfigError::Invalid("at least one classifier must be configured".into()));
        }
        let mut keys = HashSet::new();
        for entry in &self.classifiers {
            if entry.key.trim().is_empty() {
                return Err(ConfigError::Invalid("classifier keys cannot be empty".into()));
            }
            if !keys.insert(entry.key.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate classifier key '{}'", entry.key)));
            }
            if entry.kind == BackendKind::Prototype {
                if entry.tokenizer.is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "prototype classifier '{}' needs a tokenizer file", entry.key
                    )));
                }
                if entry.classes.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "prototype classifier '{}' needs at least one class", entry.key
                    )));
                }
            }
        }
        if !keys.contains(self.default_classifier.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "default classifier '{}' is not configured", self.default_classifier
            )));
        }
        if self.max_num_samples == 0 {
            return Err(ConfigError::Invalid("max_num_samples must be at least 1".into()));
        }
        if self.default_num_samples == 0 || self.default_num_samples > self.max_num_samples {
            return Err(ConfigError::Invalid(format!(
                "default_num_samples must be between 1 and {}", self.max_num_samples
            )));
        }
        if self.explain_timeout_secs == 0 {
            return Err(ConfigError::Invalid("explain_timeout_secs must be at least 1".into()));
        }
        if !(self.explainer.kernel_width.is_finite() && self.explainer.kernel_width > 0.0) {
            return Err(ConfigError::Invalid("explainer.kernel_width must be positive".into()));
        }
        if self.explainer.num_features == 0 {
            return Err(ConfigError::Invalid("explainer.num_features must be at least 1".into()));
        }
        if self.explainer.max_words == 0 {
            return Err(ConfigError::Invalid("explainer.max_words must be at least 1".into()));
        }
        Ok(())
    }

    /// Applies command-line and environment settings. An explicit models
    /// directory beats the cache root, and both beat the file.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(bind_addr) = overrides.bind_addr {
            self.bind_addr = bind_addr;
        }
        let models_dir = overrides.models_dir
            .or_else(|| overrides.cache_dir.map(ModelManager::models_dir_in));
        if let Some(models_dir) = models_dir {
            self.models_dir = Some(models_dir);
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(ModelManager::default_models_dir)
    }

    pub fn explain_timeout(&self) -> Duration {
        Duration::from_secs(self.explain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DashboardConfig::load(None).unwrap();
        assert_eq!(config.default_classifier, "fasttext");
        assert_eq!(config.default_num_samples, 5000);
        assert_eq!(config.classifiers.len(), 1);
        assert_eq!(config.classifiers[0].kind, BackendKind::Fasttext);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DashboardConfig::from_toml_str("bind_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.explain_timeout(), Duration::from_secs(120));
        assert_eq!(config.classifiers[0].key, "fasttext");
    }

    #[test]
    fn test_full_file() {
        let raw = r#"
            default_classifier = "minilm"
            default_num_samples = 1000
            fetch_missing_models = true

            [explainer]
            num_features = 8
            top_labels = 2

            [[classifiers]]
            key = "fasttext"
            name = "FastText"
            kind = "fasttext"
            file = "fasttext/model.bin"
            url = "https://example.com/model.bin"
            sha256 = "abc"

            [[classifiers]]
            key = "minilm"
            name = "MiniLM prototypes"
            kind = "prototype"
            file = "minilm/model.onnx"
            tokenizer = "minilm/tokenizer.json"
            tokenizer_url = "https://example.com/tokenizer.json"
            temperature = 0.2

            [[classifiers.classes]]
            label = "positive"
            description = "Positive sentiment"
            examples = ["great"]
        "#;
        let config = DashboardConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.classifiers.len(), 2);
        assert_eq!(config.explainer.top_labels, Some(2));
        assert_eq!(config.classifiers[1].classes[0].examples, vec!["great"]);
        let source = config.classifiers[0].source().unwrap();
        assert_eq!(source.url, "https://example.com/model.bin");
        assert_eq!(source.sha256.as_deref(), Some("abc"));
        assert!(config.classifiers[1].source().is_none());
        assert_eq!(
            config.classifiers[1].tokenizer_source().map(|s| s.url),
            Some("https://example.com/tokenizer.json".to_string())
        );
        assert!(config.classifiers[0].tokenizer_source().is_none());
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let raw = r#"
            [[classifiers]]
            key = "fasttext"
            name = "A"
            kind = "fasttext"
            file = "a.bin"

            [[classifiers]]
            key = "fasttext"
            name = "B"
            kind = "fasttext"
            file = "b.bin"
        "#;
        assert!(matches!(DashboardConfig::from_toml_str(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_default_classifier() {
        let raw = "default_classifier = \"bert\"";
        assert!(matches!(DashboardConfig::from_toml_str(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_prototype_without_tokenizer() {
        let raw = r#"
            default_classifier = "p"
            [[classifiers]]
            key = "p"
            name = "P"
            kind = "prototype"
            file = "m.onnx"
        "#;
        assert!(matches!(DashboardConfig::from_toml_str(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_sample_bounds() {
        assert!(DashboardConfig::from_toml_str("default_num_samples = 0").is_err());
        assert!(DashboardConfig::from_toml_str("max_num_samples = 10").is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            DashboardConfig::from_toml_str("bind = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides_beat_file() {
        let raw = r#"
            bind_addr = "127.0.0.1:1"
            models_dir = "/from/file"
        "#;
        let mut config = DashboardConfig::from_toml_str(raw).unwrap();
        config.apply_overrides(Overrides::default());
        assert_eq!(config.models_dir(), PathBuf::from("/from/file"));

        config.apply_overrides(Overrides {
            cache_dir: Some(PathBuf::from("/from/env")),
            ..Overrides::default()
        });
        assert_eq!(config.models_dir(), PathBuf::from("/from/env/models"));
        assert_eq!(config.bind_addr, "127.0.0.1:1");

        let mut config = DashboardConfig::from_toml_str(raw).unwrap();
        config.apply_overrides(Overrides {
            bind_addr: Some("0.0.0.0:8050".into()),
            models_dir: Some(PathBuf::from("/from/cli")),
            cache_dir: Some(PathBuf::from("/from/env")),
        });
        assert_eq!(config.models_dir(), PathBuf::from("/from/cli"));
        assert_eq!(config.bind_addr, "0.0.0.0:8050");
    }

    #[test]
    fn test_rejects_zero_max_words() {
        let raw = "[explainer]\nmax_words = 0";
        assert!(matches!(DashboardConfig::from_toml_str(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = DashboardConfig::from_file("/nonexistent/lime-dashboard.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
