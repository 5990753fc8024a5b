//! A web dashboard that explains text classifier predictions with LIME.
//!
//! The dashboard shows a form with the text to explain, the number of
//! perturbation samples and a classifier from the registry. Submitting it runs
//! the explainer and embeds the resulting HTML in a sandboxed frame.
//!
//! # Explaining a prediction
//!
//! Any type implementing [`TextClassifier`] can be explained:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use lime_dashboard::{CancelFlag, ClassifierError, ExplainerConfig, LimeTextExplainer, TextClassifier};
//! use ndarray::Array2;
//!
//! struct Keyword;
//!
//! impl TextClassifier for Keyword {
//!     fn class_names(&self) -> Vec<String> {
//!         vec!["negative".into(), "positive".into()]
//!     }
//!
//!     fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
//!         let mut probs = Array2::zeros((texts.len(), 2));
//!         for (i, text) in texts.iter().enumerate() {
//!             let p = if text.contains("great") { 0.9 } else { 0.3 };
//!             probs[[i, 0]] = 1.0 - p;
//!             probs[[i, 1]] = p;
//!         }
//!         Ok(probs)
//!     }
//! }
//!
//! let explainer = LimeTextExplainer::new(ExplainerConfig::default());
//! let explanation = explainer.explain(&Keyword, "a great movie", 500, &CancelFlag::new())?;
//! let weights = explanation.as_list(1).unwrap();
//! assert_eq!(weights[0].0, "great");
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Classifiers are `Send + Sync` and are shared between requests through
//! `Arc` in the [`ClassifierRegistry`].

pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod explain;
pub mod markup;
pub mod model_manager;
pub mod registry;
mod runtime;
pub mod server;
pub mod text;

pub use classifier::{
    ClassDefinition, ClassifierBuilder, ClassifierError, FastTextClassifier,
    ModelCharacteristics, PrototypeClassifier, TextClassifier,
};
pub use config::{ConfigError, DashboardConfig, Overrides};
pub use dashboard::{
    DashboardError, DisplayFragment, DisplayState, ExplanationRequest, FormState, RequestHandler, UserAction,
};
pub use explain::{CancelFlag, ExplainError, Explanation, ExplainerConfig, LimeTextExplainer};
pub use model_manager::{ModelError, ModelManager, ModelSource};
pub use registry::{ClassifierRegistry, RegisteredClassifier, RegistryError};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use text::{tokenize, TokenizeError};

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
