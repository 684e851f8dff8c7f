//! Axum server setup and configuration

use crate::api::routes;
use crate::engine::{Engine, EngineDeps};
use crate::services::Counters;
use crate::Config;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let deps = EngineDeps::from_config(&config, Counters::new());
        Self::with_engine(Engine::new(deps), config)
    }

    pub fn with_engine(engine: Arc<Engine>, config: Config) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/start", post(routes::engine::start_engine))
        .route("/stop", post(routes::engine::stop_engine))
        .route("/status", get(routes::engine::get_status))
        .route("/webhook", post(routes::webhook::receive_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
