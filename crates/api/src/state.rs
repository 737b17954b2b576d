use std::sync::Arc;

use pau_pipeline::submission::SubmissionPipeline;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Submission pipeline shared by every request.
    pub pipeline: Arc<SubmissionPipeline>,
    /// Submissions still running; drained on shutdown.
    pub submissions: TaskTracker,
}
