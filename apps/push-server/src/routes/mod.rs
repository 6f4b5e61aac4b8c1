pub mod index;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(crate::gateway::server::router())
        .merge(index::router())
}
