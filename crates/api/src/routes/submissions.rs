//! Route definitions for test-result submissions.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::submissions;
use crate::state::AppState;

/// Submission routes mounted at `/submissions`.
///
/// ```text
/// POST /  -> submit
/// ```
///
/// The default body limit is lifted here; the handler enforces the
/// attachment limit itself so an oversized file degrades to a warning.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submissions::submit))
        .layer(DefaultBodyLimit::disable())
}
