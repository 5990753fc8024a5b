//! HTTP front end for the dashboard.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::DashboardConfig;
use crate::dashboard::{
    page::render_page, ClassifierOption, DashboardError, DisplayFragment, FormState, PageSettings,
    RequestHandler, UserAction,
};
use crate::explain::{CancelFlag, LimeTextExplainer};
use crate::registry::ClassifierRegistry;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared, read-only state of the HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    handler: RequestHandler,
    settings: PageSettings,
    defaults: FormState,
    options: Vec<ClassifierOption>,
    timeout: Duration,
}

impl AppState {
    pub fn new(handler: RequestHandler, settings: PageSettings, defaults: FormState, timeout: Duration) -> Self {
        let options = handler.registry().iter()
            .map(|entry| ClassifierOption {
                key: entry.key.clone(),
                name: entry.name.clone(),
            })
            .collect();
        Self { handler, settings, defaults, options, timeout }
    }

    pub fn from_config(config: &DashboardConfig, registry: ClassifierRegistry) -> Self {
        let handler = RequestHandler::new(
            Arc::new(registry),
            LimeTextExplainer::new(config.explainer.clone()),
            config.max_num_samples,
        );
        Self::new(
            handler,
            PageSettings::from(config),
            FormState::with_defaults(config.default_classifier.clone(), config.default_num_samples),
            config.explain_timeout(),
        )
    }

    fn page(&self, form: &FormState, fragment: &DisplayFragment, error: Option<&str>) -> Html<String> {
        Html(render_page(&self.settings, &self.options, form, fragment, error))
    }

    /// Runs the handler off the async runtime, cancelling it after the timeout.
    async fn run(&self, action: UserAction, form: &FormState) -> Result<DisplayFragment, DashboardError> {
        let Some(request) = self.handler.prepare(action, form)? else {
            return Ok(DisplayFragment::Placeholder);
        };

        let cancel = CancelFlag::new();
        let task_cancel = cancel.clone();
        let handler = self.handler.clone();
        let task = tokio::task::spawn_blocking(move || handler.explain(&request, &task_cancel));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(DashboardError::Internal(join_error.to_string())),
            Err(_) => {
                cancel.cancel();
                Err(DashboardError::Timeout(self.timeout))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FormSubmission {
    #[serde(default)]
    text: String,
    #[serde(default)]
    num_samples: String,
    #[serde(default)]
    classifier: String,
    #[serde(default)]
    action: String,
}

impl FormSubmission {
    fn into_parts(self) -> (String, FormState) {
        let form = FormState {
            text: self.text,
            num_samples: self.num_samples,
            classifier: self.classifier,
        };
        (self.action, form)
    }
}

#[derive(Debug, Serialize)]
struct ClassifierSummary {
    key: String,
    name: String,
    classes: Vec<String>,
}

fn status_for(error: &DashboardError) -> StatusCode {
    match error {
        DashboardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        e if e.is_rejection() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/healthz", get(healthz))
        .route("/api/classifiers", get(list_classifiers))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Serves the dashboard until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    state.page(&state.defaults, &DisplayFragment::Placeholder, None)
}

async fn submit(State(state): State<Arc<AppState>>, Form(submission): Form<FormSubmission>) -> Response {
    let (action, form) = submission.into_parts();
    let (form, result) = match action.parse::<UserAction>() {
        Ok(UserAction::Reset) => {
            let form = form.on_reset();
            let result = state.run(UserAction::Reset, &form).await;
            (form, result)
        }
        Ok(UserAction::Submit) => {
            let result = state.run(UserAction::Submit, &form).await;
            (form, result)
        }
        Err(e) => (form, Err(e)),
    };

    match result {
        Ok(fragment) => (StatusCode::OK, state.page(&form, &fragment, None)).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                log::warn!("Rejected request: {}", e);
            } else {
                log::error!("Explanation failed: {}", e);
            }
            let message = e.to_string();
            (status, state.page(&form, &DisplayFragment::Placeholder, Some(&message))).into_response()
        }
    }
}

async fn list_classifiers(State(state): State<Arc<AppState>>) -> Json<Vec<ClassifierSummary>> {
    let summaries = state.handler.registry().iter()
        .map(|entry| ClassifierSummary {
            key: entry.key.clone(),
            name: entry.name.clone(),
            classes: entry.classifier.class_names(),
        })
        .collect();
    Json(summaries)
}
