use axum::{Json, Router, routing::get};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::handlers::{self, AppState};
use crate::metrics::{CoreStatistics, NfTypeStatistics};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "mgmtd RESTCONF",
        version = "0.1.0",
        description = "RESTCONF (RFC 8040) view of the 5G core running configuration: network functions, subscribers, sessions and QoS profiles. Every write is a single-step edit of the running datastore.",
        license(name = "MIT")
    ),
    tags(
        (name = "restconf", description = "Root resource discovery"),
        (name = "data", description = "Running datastore resources"),
        (name = "statistics", description = "Derived counters")
    ),
    paths(
        handlers::get_root,
        handlers::host_meta,
        handlers::get_data_root,
        handlers::get_data,
        handlers::post_data,
        handlers::put_data,
        handlers::patch_data,
        handlers::delete_data,
        handlers::get_statistics,
    ),
    components(schemas(
        handlers::ApiError,
        handlers::RestconfErrorList,
        handlers::RestconfError,
        CoreStatistics,
        NfTypeStatistics,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/.well-known/host-meta", get(handlers::host_meta))
        .route("/restconf", get(handlers::get_root))
        .route("/restconf/data", get(handlers::get_data_root))
        .route(
            "/restconf/data/{*path}",
            get(handlers::get_data)
                .post(handlers::post_data)
                .put(handlers::put_data)
                .patch(handlers::patch_data)
                .delete(handlers::delete_data),
        )
        .route("/restconf/statistics", get(handlers::get_statistics))
        .route("/restconf/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
