//! Form handling for the explanation dashboard.
//!
//! A form submission becomes a [`DisplayFragment`]: either the hidden
//! placeholder or a sandboxed frame with the rendered explanation.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::explain::{CancelFlag, ExplainError, IndexedString, LimeTextExplainer};
use crate::registry::ClassifierRegistry;
use crate::text::{self, TokenizeError};

mod fragment;
pub mod page;

pub use fragment::{DisplayFragment, DisplayState, PLACEHOLDER_HTML};
pub use page::{ClassifierOption, PageSettings};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Unknown classifier '{0}'")]
    UnknownClassifier(String),
    #[error("Number of samples must be a positive whole number, got '{0}'")]
    InvalidSampleCount(String),
    #[error("Number of samples {requested} exceeds the maximum of {max}")]
    SampleCountTooLarge { requested: String, max: usize },
    #[error("The text has {words} distinct words, at most {max} can be explained")]
    TooManyWords { words: usize, max: usize },
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Could not tokenize the text: {0}")]
    Tokenize(#[from] TokenizeError),
    #[error("Could not explain this text: {0}")]
    Explain(#[from] ExplainError),
    #[error("The explanation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("The explanation task failed: {0}")]
    Internal(String),
}

impl DashboardError {
    /// True when the request itself was invalid, as opposed to a failure while serving it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DashboardError::UnknownClassifier(_)
                | DashboardError::InvalidSampleCount(_)
                | DashboardError::SampleCountTooLarge { .. }
                | DashboardError::TooManyWords { .. }
                | DashboardError::UnknownAction(_)
                | DashboardError::Explain(ExplainError::NoFeatures)
                | DashboardError::Explain(ExplainError::TooManyWords { .. })
        )
    }
}

/// Which button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserAction {
    #[default]
    Submit,
    Reset,
}

impl FromStr for UserAction {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "explain" | "submit" => Ok(UserAction::Submit),
            "reset" => Ok(UserAction::Reset),
            other => Err(DashboardError::UnknownAction(other.to_string())),
        }
    }
}

/// Current widget values. The sample count is kept as typed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormState {
    pub text: String,
    pub num_samples: String,
    pub classifier: String,
}

impl FormState {
    pub fn with_defaults(classifier: impl Into<String>, num_samples: usize) -> Self {
        Self {
            text: String::new(),
            num_samples: num_samples.to_string(),
            classifier: classifier.into(),
        }
    }

    /// Clears the text and keeps the other widgets.
    pub fn on_reset(self) -> Self {
        Self {
            text: String::new(),
            ..self
        }
    }
}

/// A validated request ready for the explainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationRequest {
    pub classifier_key: String,
    pub raw_text: String,
    pub sample_count: usize,
}

/// Parses a sample count such as `"100"` or `"100.0"`.
pub fn parse_sample_count(raw: &str, max: usize) -> Result<usize, DashboardError> {
    let trimmed = raw.trim();
    let invalid = || DashboardError::InvalidSampleCount(trimmed.to_string());
    let too_large = || DashboardError::SampleCountTooLarge { requested: trimmed.to_string(), max };

    if let Ok(value) = trimmed.parse::<u64>() {
        if value == 0 {
            return Err(invalid());
        }
        return usize::try_from(value).ok()
            .filter(|&v| v <= max)
            .ok_or_else(too_large);
    }
    let value = trimmed.parse::<f64>().map_err(|_| invalid())?;
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(invalid());
    }
    if value > max as f64 {
        return Err(too_large());
    }
    Ok(value as usize)
}

/// Turns form submissions into display fragments.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    registry: Arc<ClassifierRegistry>,
    explainer: LimeTextExplainer,
    max_samples: usize,
}

impl RequestHandler {
    pub fn new(registry: Arc<ClassifierRegistry>, explainer: LimeTextExplainer, max_samples: usize) -> Self {
        Self { registry, explainer, max_samples }
    }

    pub fn registry(&self) -> &ClassifierRegistry {
        &self.registry
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Validates the form. `None` means the placeholder should be shown.
    pub fn prepare(&self, trigger: UserAction, form: &FormState) -> Result<Option<ExplanationRequest>, DashboardError> {
        if trigger == UserAction::Reset || form.text.trim().is_empty() {
            return Ok(None);
        }
        if !self.registry.contains(&form.classifier) {
            return Err(DashboardError::UnknownClassifier(form.classifier.clone()));
        }
        let num_samples = parse_sample_count(&form.num_samples, self.max_samples)?;
        let words = IndexedString::new(&text::tokenize(&form.text)?).num_words();
        let max = self.explainer.config().max_words;
        if words > max {
            return Err(DashboardError::TooManyWords { words, max });
        }
        Ok(Some(ExplanationRequest {
            classifier_key: form.classifier.clone(),
            raw_text: form.text.clone(),
            sample_count: num_samples,
        }))
    }

    /// Tokenizes and explains a validated request.
    pub fn explain(&self, request: &ExplanationRequest, cancel: &CancelFlag) -> Result<DisplayFragment, DashboardError> {
        let entry = self.registry.get(&request.classifier_key)
            .ok_or_else(|| DashboardError::UnknownClassifier(request.classifier_key.clone()))?;
        let tokenized = text::tokenize(&request.raw_text)?;

        let started = Instant::now();
        let explanation = self.explainer.explain(
            entry.classifier.as_ref(),
            &tokenized,
            request.sample_count,
            cancel,
        )?;
        log::info!(
            "Explained {} words with '{}' using {} samples in {:?}",
            explanation.text.num_words(),
            entry.key,
            request.sample_count,
            started.elapsed()
        );
        Ok(DisplayFragment::Rendered(explanation.as_html()))
    }

    pub fn on_user_action(
        &self,
        trigger: UserAction,
        form: &FormState,
        cancel: &CancelFlag,
    ) -> Result<DisplayFragment, DashboardError> {
        match self.prepare(trigger, form)? {
            Some(request) => self.explain(&request, cancel),
            None => Ok(DisplayFragment::Placeholder),
        }
    }
}
