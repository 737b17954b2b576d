//! Route definitions for theme descriptors.

use axum::routing::get;
use axum::Router;

use crate::handlers::themes;
use crate::state::AppState;

/// Theme routes mounted at `/themes`.
///
/// ```text
/// GET /        -> list_themes
/// GET /{name}  -> get_theme
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(themes::list_themes))
        .route("/{name}", get(themes::get_theme))
}
