//! The gateway's HTTP router and middleware.
//!
//! The binary and the integration tests both call [`build_app_router`], so
//! tests run against the production layer order.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::handlers::submissions::RECORD_FILE_HEADER;
use crate::routes;
use crate::state::AppState;

/// Mount `/health` and the `/api/v1` routes (themes, submissions) behind
/// the middleware stack.
///
/// Outermost first, a request passes CORS, gets an `x-request-id`, is
/// traced, has its id copied onto the response, and is then subject to the
/// request timeout and panic recovery. The timeout bounds reading the form
/// and producing the response head. A submission transcript keeps streaming
/// afterwards, bounded by the per-process timeouts instead.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = build_cors_layer(config);
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        // Unversioned, for load balancers.
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// CORS for the form front end: GET and POST only, and the record-file
/// header is exposed so the page can show which file was written.
///
/// Panics on an origin that does not parse.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(RECORD_FILE_HEADER)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
