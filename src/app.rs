use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::html::{BasicHtmlRenderer, HtmlRenderer};
use crate::config::AppConfig;
use crate::database::store::Store;
use crate::handlers;

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub renderer: Arc<dyn HtmlRenderer>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            store,
            renderer: Arc::new(BasicHtmlRenderer),
            config: Arc::new(config),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn HtmlRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

pub fn app(state: AppState) -> Router {
    let mount = state.config.api.mount.clone();
    let body_limit = state.config.api.max_request_size_bytes;
    let cors = cors_layer(&state.config);

    let mut router = Router::new()
        .merge(service_routes())
        .merge(resource_routes(&mount))
        .layer(DefaultBodyLimit::max(body_limit));

    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    if let Some(cors) = cors {
        router = router.layer(cors);
    }
    router.with_state(state)
}

fn service_routes() -> Router<AppState> {
    use handlers::{health, login};

    Router::new()
        .route("/health", get(health::get))
        .route("/login", get(login::form).post(login::submit))
        .route("/logout", post(login::logout))
}

fn resource_routes(mount: &str) -> Router<AppState> {
    use handlers::{permission, project, project_list, record};

    Router::new()
        .route(mount, get(project_list::get))
        .route(&format!("{}:project/", mount), get(project::get).put(project::put))
        .route(
            &format!("{}:project/permissions/", mount),
            get(permission::get).post(permission::post),
        )
        .route(
            &format!("{}:project/:label/", mount),
            get(record::get).put(record::put).delete(record::delete),
        )
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if !config.security.enable_cors {
        return None;
    }
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        Some(CorsLayer::permissive())
    } else {
        Some(CorsLayer::new().allow_origin(origins))
    }
}
