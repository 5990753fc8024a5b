mod common;

use std::fs;
use std::sync::Arc;

use lime_dashboard::{
    tokenize, CancelFlag, ClassifierRegistry, DashboardConfig, DashboardError, DisplayFragment, DisplayState,
    ExplainError, ExplainerConfig, FormState, LimeTextExplainer, ModelManager, RequestHandler, UserAction,
};
use tempfile::TempDir;

use common::{fasttext_model_bytes, form, handler, KeywordClassifier};

#[test]
fn test_submit_then_reset_cycle() {
    let handler = handler();
    let cancel = CancelFlag::new();
    let state = form("What a great film, not bad at all", "300", "keyword");

    let shown = handler.on_user_action(UserAction::Submit, &state, &cancel).unwrap();
    assert_eq!(shown.state(), DisplayState::Showing);

    let state = state.on_reset();
    assert_eq!(state.text, "");
    assert_eq!(state.num_samples, "300");
    let cleared = handler.on_user_action(UserAction::Reset, &state, &cancel).unwrap();
    assert_eq!(cleared, DisplayFragment::Placeholder);
}

#[test]
fn test_rendered_fragment_is_the_explainer_output() {
    let handler = handler();
    let raw = "Not good, not awful either.";
    let fragment = handler
        .on_user_action(UserAction::Submit, &form(raw, "250", "keyword"), &CancelFlag::new())
        .unwrap();

    let explainer = LimeTextExplainer::new(ExplainerConfig {
        batch_size: 64,
        ..ExplainerConfig::default()
    });
    let expected = explainer
        .explain(&KeywordClassifier, &tokenize(raw).unwrap(), 250, &CancelFlag::new())
        .unwrap()
        .as_html();
    assert_eq!(fragment, DisplayFragment::Rendered(expected));
}

#[test]
fn test_new_submission_replaces_content() {
    let handler = handler();
    let cancel = CancelFlag::new();
    let first = handler
        .on_user_action(UserAction::Submit, &form("great", "100", "keyword"), &cancel)
        .unwrap();
    let second = handler
        .on_user_action(UserAction::Submit, &form("awful plot", "100", "keyword"), &cancel)
        .unwrap();
    assert_ne!(first, second);
    let DisplayFragment::Rendered(html) = second else {
        panic!("expected rendered explanation");
    };
    assert!(html.contains("awful"));
    assert!(!html.contains(">great<"));
}

#[test]
fn test_validation_errors() {
    let handler = handler();
    let cancel = CancelFlag::new();
    assert!(matches!(
        handler.on_user_action(UserAction::Submit, &form("great", "100", "bert"), &cancel),
        Err(DashboardError::UnknownClassifier(key)) if key == "bert"
    ));
    assert!(matches!(
        handler.on_user_action(UserAction::Submit, &form("great", "-3", "keyword"), &cancel),
        Err(DashboardError::InvalidSampleCount(_))
    ));
    assert!(matches!(
        handler.on_user_action(UserAction::Submit, &form("great", "5001", "keyword"), &cancel),
        Err(DashboardError::SampleCountTooLarge { max: 5000, .. })
    ));
    assert!(matches!(
        handler.on_user_action(UserAction::Submit, &form("...", "100", "keyword"), &cancel),
        Err(DashboardError::Explain(ExplainError::NoFeatures))
    ));
}

#[test]
fn test_blank_text_is_not_sent_to_the_classifier() {
    let handler = handler();
    // The slow classifier would take seconds if it were called
    let fragment = handler
        .on_user_action(UserAction::Submit, &form("   ", "5000", "slow"), &CancelFlag::new())
        .unwrap();
    assert_eq!(fragment, DisplayFragment::Placeholder);
}

#[test]
fn test_fasttext_model_from_models_dir() {
    let dir = TempDir::new().unwrap();
    let model = fasttext_model_bytes(
        &["great", "awful", "film"],
        &["__label__1", "__label__5"],
        &[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 0.0], vec![0.0, 0.0]],
        &[vec![3.0, -3.0], vec![-3.0, 3.0]],
    );
    fs::create_dir_all(dir.path().join("fasttext")).unwrap();
    fs::write(dir.path().join("fasttext/sst5_hyperopt.bin"), model).unwrap();

    let config = DashboardConfig {
        models_dir: Some(dir.path().to_path_buf()),
        ..DashboardConfig::default()
    };
    let manager = ModelManager::new(config.models_dir()).unwrap();
    let registry = ClassifierRegistry::load(&config, &manager).unwrap();
    assert_eq!(registry.get("fasttext").unwrap().classifier.class_names(), vec!["1", "5"]);

    let handler = RequestHandler::new(
        Arc::new(registry),
        LimeTextExplainer::new(config.explainer.clone()),
        config.max_num_samples,
    );
    let state = FormState {
        text: "A great film!".into(),
        ..FormState::with_defaults("fasttext", 500)
    };
    let fragment = handler.on_user_action(UserAction::Submit, &state, &CancelFlag::new()).unwrap();
    let DisplayFragment::Rendered(html) = fragment else {
        panic!("expected rendered explanation");
    };
    assert!(html.contains("Class 5"));
    assert!(html.contains(">great</span>"));
}

#[test]
fn test_default_config_points_at_fasttext() {
    let config = DashboardConfig::default();
    let state = FormState::with_defaults(config.default_classifier.clone(), config.default_num_samples);
    assert_eq!(state.classifier, "fasttext");
    assert_eq!(state.num_samples, "5000");
    assert_eq!(config.classifiers[0].file.to_str(), Some("fasttext/sst5_hyperopt.bin"));
}
