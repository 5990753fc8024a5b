//! LIME explanations for text classifiers.
//!
//! The explainer removes random subsets of words from the input, asks the
//! classifier for class probabilities on every perturbed text, and fits a
//! locally weighted linear model per explained class. The coefficients are the
//! word contributions shown to the user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::classifier::{ClassifierError, TextClassifier};

mod html;
mod indexed;
mod ridge;

pub use indexed::IndexedString;

const SELECTION_ALPHA: f64 = 0.01;
const FORWARD_SELECTION_ALPHA: f64 = 0.0;
const MODEL_ALPHA: f64 = 1.0;
const FORWARD_SELECTION_MAX_FEATURES: usize = 6;
const PERTURB_CHECK_INTERVAL: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error("the text contains no words to explain")]
    NoFeatures,
    #[error("the text has {words} distinct words, at most {max} can be explained")]
    TooManyWords { words: usize, max: usize },
    #[error("the number of samples must be at least 1")]
    NoSamples,
    #[error("classifier failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("classifier returned {actual:?} probabilities, expected {expected:?}")]
    ClassifierOutput {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("classifier has no classes")]
    NoClasses,
    #[error("explanation was cancelled")]
    Cancelled,
}

/// Cooperative cancellation shared between a request and its explainer run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning knobs for [`LimeTextExplainer`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplainerConfig {
    /// Maximum number of words reported per class
    pub num_features: usize,
    /// Explain only the most probable classes; all classes when unset
    pub top_labels: Option<usize>,
    pub kernel_width: f64,
    pub random_seed: u64,
    /// Number of perturbed texts sent to the classifier per call
    pub batch_size: usize,
    /// Longer texts are rejected before any samples are drawn
    pub max_words: usize,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            num_features: 20,
            top_labels: None,
            kernel_width: 25.0,
            random_seed: 42,
            batch_size: 256,
            max_words: 500,
        }
    }
}

/// Local linear model for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelExplanation {
    /// Column of the class in the classifier output
    pub label: usize,
    pub intercept: f64,
    /// `(feature, weight)` pairs sorted by decreasing absolute weight
    pub weights: Vec<(usize, f64)>,
    /// Weighted R² of the local model on the perturbed samples
    pub score: f64,
    /// Local model prediction for the unperturbed text
    pub local_prediction: f64,
}

/// The result of explaining one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub class_names: Vec<String>,
    pub text: IndexedString,
    /// Classifier probabilities for the unperturbed text
    pub predict_proba: Vec<f32>,
    pub labels: Vec<LabelExplanation>,
}

impl Explanation {
    /// `(word, weight)` pairs for a class column, or `None` if it was not explained.
    pub fn as_list(&self, label: usize) -> Option<Vec<(String, f64)>> {
        self.labels.iter()
            .find(|l| l.label == label)
            .map(|l| {
                l.weights.iter()
                    .map(|&(feature, weight)| (self.text.word(feature).to_string(), weight))
                    .collect()
            })
    }

    /// Index of the most probable class.
    pub fn top_label(&self) -> Option<usize> {
        self.predict_proba.iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }
}

/// Explains text classifier predictions with LIME.
#[derive(Debug, Clone, Default)]
pub struct LimeTextExplainer {
    config: ExplainerConfig,
}

impl LimeTextExplainer {
    pub fn new(config: ExplainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    /// Explains `classifier`'s prediction for `text` using `num_samples` samples,
    /// the first of which is the unperturbed text.
    pub fn explain(
        &self,
        classifier: &dyn TextClassifier,
        text: &str,
        num_samples: usize,
        cancel: &CancelFlag,
    ) -> Result<Explanation, ExplainError> {
        if num_samples == 0 {
            return Err(ExplainError::NoSamples);
        }
        let class_names = classifier.class_names();
        if class_names.is_empty() {
            return Err(ExplainError::NoClasses);
        }
        let indexed = IndexedString::new(text);
        let num_words = indexed.num_words();
        if num_words == 0 {
            return Err(ExplainError::NoFeatures);
        }
        if num_words > self.config.max_words {
            return Err(ExplainError::TooManyWords { words: num_words, max: self.config.max_words });
        }

        let (data, texts) = self.perturb(&indexed, num_samples, cancel)?;
        let labels = self.classify(classifier, &texts, class_names.len(), cancel)?;
        let weights = self.kernel_weights(&data);

        let predict_proba: Vec<f32> = labels.row(0).iter().map(|&p| p as f32).collect();
        let explained = self.labels_to_explain(&predict_proba);

        let mut label_explanations = Vec::with_capacity(explained.len());
        for label in explained {
            if cancel.is_cancelled() {
                return Err(ExplainError::Cancelled);
            }
            let column = labels.column(label);
            let used = self.select_features(&data, column.to_owned(), &weights, cancel)?;
            let selected = data.select(Axis(1), &used);
            let model = ridge::fit(selected.view(), column, weights.view(), MODEL_ALPHA, cancel)?;

            let score = model.score(selected.view(), column, weights.view());
            let local_prediction = model.predict(selected.slice(s![0..1, ..]))[0];
            let mut feature_weights: Vec<(usize, f64)> = used.iter()
                .copied()
                .zip(model.coef.iter().copied())
                .collect();
            feature_weights.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));

            label_explanations.push(LabelExplanation {
                label,
                intercept: model.intercept,
                weights: feature_weights,
                score,
                local_prediction,
            });
        }

        Ok(Explanation {
            class_names,
            text: indexed,
            predict_proba,
            labels: label_explanations,
        })
    }

    /// Builds the binary feature matrix and the perturbed texts.
    fn perturb(
        &self,
        indexed: &IndexedString,
        num_samples: usize,
        cancel: &CancelFlag,
    ) -> Result<(Array2<f64>, Vec<String>), ExplainError> {
        let num_words = indexed.num_words();
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let mut data = Array2::<f64>::ones((num_samples, num_words));
        let mut texts = Vec::with_capacity(num_samples);
        texts.push(indexed.raw_string().to_string());

        for i in 1..num_samples {
            if i % PERTURB_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(ExplainError::Cancelled);
            }
            let remove = rng.gen_range(1..=num_words);
            let inactive = rand::seq::index::sample(&mut rng, num_words, remove).into_vec();
            for &feature in &inactive {
                data[[i, feature]] = 0.0;
            }
            texts.push(indexed.inverse_removing(&inactive));
        }
        debug!("Generated {} perturbed samples over {} words", num_samples, num_words);
        Ok((data, texts))
    }

    fn classify(
        &self,
        classifier: &dyn TextClassifier,
        texts: &[String],
        num_classes: usize,
        cancel: &CancelFlag,
    ) -> Result<Array2<f64>, ExplainError> {
        let mut labels = Array2::<f64>::zeros((texts.len(), num_classes));
        let batch_size = self.config.batch_size.max(1);
        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(ExplainError::Cancelled);
            }
            let probs = classifier.predict_proba(batch)?;
            if probs.dim() != (batch.len(), num_classes) {
                return Err(ExplainError::ClassifierOutput {
                    expected: (batch.len(), num_classes),
                    actual: probs.dim(),
                });
            }
            let start = batch_index * batch_size;
            labels
                .slice_mut(s![start..start + batch.len(), ..])
                .assign(&probs.mapv(f64::from));
        }
        Ok(labels)
    }

    /// Exponential kernel over the cosine distance to the original sample.
    fn kernel_weights(&self, data: &Array2<f64>) -> Array1<f64> {
        let num_words = data.ncols() as f64;
        let width = self.config.kernel_width;
        data.rows()
            .into_iter()
            .map(|row| {
                let active = row.sum();
                let similarity = if active > 0.0 { (active / num_words).sqrt() } else { 0.0 };
                let distance = (1.0 - similarity) * 100.0;
                (-(distance * distance) / (width * width)).exp().sqrt()
            })
            .collect()
    }

    fn labels_to_explain(&self, predict_proba: &[f32]) -> Vec<usize> {
        match self.config.top_labels {
            Some(k) => {
                let mut order: Vec<usize> = (0..predict_proba.len()).collect();
                order.sort_by(|&a, &b| {
                    predict_proba[b].partial_cmp(&predict_proba[a]).unwrap_or(std::cmp::Ordering::Equal)
                });
                order.truncate(k.max(1));
                order
            }
            None => (0..predict_proba.len()).collect(),
        }
    }

    fn select_features(
        &self,
        data: &Array2<f64>,
        labels: Array1<f64>,
        weights: &Array1<f64>,
        cancel: &CancelFlag,
    ) -> Result<Vec<usize>, ExplainError> {
        let num_features = self.config.num_features.min(data.ncols());
        if num_features <= FORWARD_SELECTION_MAX_FEATURES {
            forward_selection(data, &labels, weights, num_features, cancel)
        } else {
            highest_weights(data, &labels, weights, num_features, cancel)
        }
    }
}

/// Ranks features by the magnitude of their contribution to the original sample.
fn highest_weights(
    data: &Array2<f64>,
    labels: &Array1<f64>,
    weights: &Array1<f64>,
    num_features: usize,
    cancel: &CancelFlag,
) -> Result<Vec<usize>, ExplainError> {
    let model = ridge::fit(data.view(), labels.view(), weights.view(), SELECTION_ALPHA, cancel)?;
    let contributions = &model.coef * &data.row(0);
    let mut order: Vec<usize> = (0..data.ncols()).collect();
    order.sort_by(|&a, &b| {
        contributions[b].abs().partial_cmp(&contributions[a].abs()).unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(num_features);
    Ok(order)
}

/// Greedily adds the feature that most improves the weighted fit.
fn forward_selection(
    data: &Array2<f64>,
    labels: &Array1<f64>,
    weights: &Array1<f64>,
    num_features: usize,
    cancel: &CancelFlag,
) -> Result<Vec<usize>, ExplainError> {
    let mut used: Vec<usize> = Vec::with_capacity(num_features);
    for _ in 0..num_features {
        let mut best: Option<(usize, f64)> = None;
        for feature in 0..data.ncols() {
            if used.contains(&feature) {
                continue;
            }
            let mut candidate = used.clone();
            candidate.push(feature);
            let selected = data.select(Axis(1), &candidate);
            let model = ridge::fit(selected.view(), labels.view(), weights.view(), FORWARD_SELECTION_ALPHA, cancel)?;
            let score = model.score(selected.view(), labels.view(), weights.view());
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((feature, score));
            }
        }
        match best {
            Some((feature, _)) => used.push(feature),
            None => break,
        }
    }
    Ok(used)
}
