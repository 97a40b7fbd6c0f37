use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use cairn_protocol::{endpoints, PROTOCOL_VERSION, VERSION_HEADER};
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

async fn stamp_version(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static(PROTOCOL_VERSION));
    response
}

/// Build the axum router with all batch store endpoints, nested under the
/// configured namespace if there is one.
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route(endpoints::GET_REFS, post(handler::get_refs))
        .route(endpoints::HAS_REFS, post(handler::has_refs))
        .route(endpoints::WRITE_VALUE, post(handler::write_value))
        .route(endpoints::ROOT, get(handler::get_root).post(handler::post_root))
        .route(endpoints::POST_REFS, post(handler::post_refs))
        .route("/ref/:hash", get(handler::get_ref));

    let routes = match state.config.namespace_prefix() {
        Some(prefix) => Router::new().nest(&prefix, routes),
        None => routes,
    };

    routes
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(middleware::map_response(stamp_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
