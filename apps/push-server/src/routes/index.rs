//! Placeholder page for plain HTTP requests that are not socket upgrades.

use axum::response::Html;
use axum::Router;

use crate::AppState;

const PLACEHOLDER: &str =
    "<h1>Komodo Collaboration Push Server</h1>\nWhat are you doing here?";

pub fn router() -> Router<AppState> {
    Router::new().fallback(placeholder)
}

pub async fn placeholder() -> Html<&'static str> {
    Html(PLACEHOLDER)
}
