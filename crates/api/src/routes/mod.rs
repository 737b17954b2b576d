pub mod health;
pub mod submissions;
pub mod themes;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /submissions                 submit a test result (POST, multipart)
/// /themes                      list theme descriptors
/// /themes/{name}               resolved theme descriptor
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/submissions", submissions::router())
        .nest("/themes", themes::router())
}
