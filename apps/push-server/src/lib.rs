pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod routes;

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use auth::verifier::IdentityVerifier;
use config::Config;
use gateway::fanout::Dispatcher;
use gateway::registry::SessionStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub dispatcher: Arc<Dispatcher>,
    pub supported_versions: Arc<HashSet<String>>,
}

impl AppState {
    /// Build state around a fresh, empty session store.
    pub fn new(config: Config, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let dispatcher = Arc::new(Dispatcher::new(sessions.clone(), config.channel_prefix.clone()));
        let supported_versions = Arc::new(config.supported_versions.clone());
        Self {
            config: Arc::new(config),
            sessions,
            verifier,
            dispatcher,
            supported_versions,
        }
    }
}

/// The full HTTP application: socket endpoint plus placeholder page.
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
