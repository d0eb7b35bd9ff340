use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::handlers::{
    activate_handler, license_info_handler, livez_handler, product_version_handler,
    readyz_handler, update_license_handler, AppState,
};
use crate::server::logging::request_logging;

/// Build the application router.
///
/// # Routes
///
/// - `POST /api/v1/activate` - Activate a machine (`X-License-Key` header)
/// - `GET /api/v1/license/{license_key}` - License summary
/// - `PUT /api/v1/license/{license_key}` - Report installed version
/// - `GET /api/v1/productver/{product_guid}` - Latest product version
/// - `GET /livez` - Liveness probe
/// - `GET /readyz` - Readiness probe (pings the database)
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/activate", post(activate_handler))
        .route(
            "/api/v1/license/:license_key",
            get(license_info_handler).put(update_license_handler),
        )
        .route("/api/v1/productver/:product_guid", get(product_version_handler))
        .route("/livez", get(livez_handler))
        .route("/readyz", get(readyz_handler))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
