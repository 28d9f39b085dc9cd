pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;

pub use app::{app, AppState};
pub use error::ApiError;

/// Install the tracing subscriber used by both binaries
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sumatra_server=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
