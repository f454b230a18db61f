//! Route registration: system endpoints plus every module under `/api`.

use axum::Router;
use axum::response::IntoResponse;
use axum::routing::get;

/// Build the complete router.
///
/// Module routers arrive with their state already attached and handle
/// their own authentication.
pub fn build_router(module_routes: Vec<(&str, Router)>) -> Router {
    let mut api = Router::new();
    for (name, router) in module_routes {
        tracing::debug!(module = name, "mounting module routes under /api");
        api = api.merge(router);
    }

    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .nest("/api", api)
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "supplyerpd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
