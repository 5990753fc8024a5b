#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lime_dashboard::dashboard::PageSettings;
use lime_dashboard::server::AppState;
use lime_dashboard::{
    ClassifierError, ClassifierRegistry, DashboardConfig, ExplainerConfig, FormState, LimeTextExplainer,
    RequestHandler, TextClassifier,
};
use ndarray::Array2;

/// Five sentiment classes driven by a handful of keywords.
pub struct KeywordClassifier;

impl TextClassifier for KeywordClassifier {
    fn class_names(&self) -> Vec<String> {
        (1..=5).map(|i| i.to_string()).collect()
    }

    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        let mut probs = Array2::zeros((texts.len(), 5));
        for (i, text) in texts.iter().enumerate() {
            let mut score = 0i32;
            for word in text.split_whitespace() {
                match word.to_lowercase().as_str() {
                    "great" | "wonderful" => score += 2,
                    "good" => score += 1,
                    "bad" => score -= 1,
                    "awful" | "terrible" => score -= 2,
                    _ => {}
                }
            }
            let class = (score.clamp(-2, 2) + 2) as usize;
            for j in 0..5 {
                probs[[i, j]] = if j == class { 0.6 } else { 0.1 };
            }
        }
        Ok(probs)
    }
}

/// Sleeps on every batch so requests outlive short timeouts.
pub struct SlowClassifier(pub Duration);

impl TextClassifier for SlowClassifier {
    fn class_names(&self) -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        std::thread::sleep(self.0);
        Ok(Array2::from_elem((texts.len(), 2), 0.5))
    }
}

/// Counts `predict_proba` calls, sleeping on each one.
pub struct CountingClassifier {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl TextClassifier for CountingClassifier {
    fn class_names(&self) -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Array2::from_elem((texts.len(), 2), 0.5))
    }
}

pub fn registry() -> ClassifierRegistry {
    ClassifierRegistry::new()
        .with_classifier("keyword", "Keyword sentiment", Arc::new(KeywordClassifier))
        .unwrap()
        .with_classifier("slow", "Slow", Arc::new(SlowClassifier(Duration::from_millis(200))))
        .unwrap()
}

pub fn handler() -> RequestHandler {
    handler_with(registry())
}

pub fn handler_with(registry: ClassifierRegistry) -> RequestHandler {
    let config = ExplainerConfig {
        batch_size: 64,
        ..ExplainerConfig::default()
    };
    RequestHandler::new(Arc::new(registry), LimeTextExplainer::new(config), 5000)
}

pub fn app_state(timeout: Duration) -> AppState {
    app_state_with(registry(), timeout)
}

pub fn app_state_with(registry: ClassifierRegistry, timeout: Duration) -> AppState {
    let config = DashboardConfig::default();
    AppState::new(
        handler_with(registry),
        PageSettings::from(&config),
        FormState::with_defaults("keyword", 300),
        timeout,
    )
}

pub fn form(text: &str, num_samples: &str, classifier: &str) -> FormState {
    FormState {
        text: text.into(),
        num_samples: num_samples.into(),
        classifier: classifier.into(),
    }
}

/// Writes a dense softmax fastText model with the given vocabulary.
///
/// `input` holds one row per word followed by `</s>`; `output` one row per label.
pub fn fasttext_model_bytes(words: &[&str], labels: &[&str], input: &[Vec<f32>], output: &[Vec<f32>]) -> Vec<u8> {
    let dim = output.first().map(|r| r.len()).unwrap_or(0) as i32;
    let mut buf = Vec::new();
    buf.extend_from_slice(&793_712_314i32.to_le_bytes());
    buf.extend_from_slice(&12i32.to_le_bytes());
    // dim, ws, epoch, minCount, neg, wordNgrams, loss (softmax), model (supervised),
    // bucket, minn, maxn, lrUpdateRate
    for value in [dim, 5, 5, 1, 5, 1, 3, 3, 0, 0, 0, 100] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&1e-4f64.to_le_bytes());

    let mut entries: Vec<(&str, u8)> = words.iter().map(|w| (*w, 0u8)).collect();
    entries.push(("</s>", 0));
    entries.extend(labels.iter().map(|l| (*l, 1u8)));
    let nwords = words.len() as i32 + 1;

    buf.extend_from_slice(&(entries.len() as i32).to_le_bytes());
    buf.extend_from_slice(&nwords.to_le_bytes());
    buf.extend_from_slice(&(labels.len() as i32).to_le_bytes());
    buf.extend_from_slice(&1000i64.to_le_bytes());
    buf.extend_from_slice(&(-1i64).to_le_bytes());
    for (entry, kind) in entries {
        buf.extend_from_slice(entry.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&10i64.to_le_bytes());
        buf.push(kind);
    }

    for matrix in [input, output] {
        buf.push(0);
        let cols = matrix.first().map(|r| r.len()).unwrap_or(0);
        buf.extend_from_slice(&(matrix.len() as i64).to_le_bytes());
        buf.extend_from_slice(&(cols as i64).to_le_bytes());
        for row in matrix {
            for value in row {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    buf
}
