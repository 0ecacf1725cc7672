//! HTTP router.
//!
//! Routes are nested under `/api/`. Everything except the health check
//! requires the identity middleware. Uploads are capped by
//! `DefaultBodyLimit` from the configured maximum.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Room for multipart boundaries and part headers on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the API router.
///
/// Endpoint handlers use `State<ApiContext>`; the identity middleware
/// injects `UserContext` as a request extension.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let body_limit = core.max_upload_bytes + MULTIPART_OVERHEAD;
    let ctx = ApiContext::new(core);

    let protected = Router::new()
        .route(
            "/patients/:patient_id/reports",
            post(endpoints::reports::upload).get(endpoints::reports::list),
        )
        .route("/reports/parse", post(endpoints::reports::parse))
        .route("/reports/:report_id", get(endpoints::reports::detail))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::identity::require_user));

    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected.merge(unprotected))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
