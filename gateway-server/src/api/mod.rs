mod authn_middleware;
pub(crate) mod health;
pub(crate) mod oauth;
mod proxy;

use crate::openapi::ApiDoc;
use crate::state::AppState;
use axum::Router;
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

/// Combines all API routes into a single router, plus the OpenAPI document describing them.
/// Requests no endpoint claims fall through to the proxy.
pub(super) fn router(state: &AppState) -> (Router<AppState>, OpenApiDoc) {
    let (router, api_doc) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(health::router())
        .merge(oauth::router(state))
        .split_for_parts();

    (router.fallback(proxy::proxy_request), api_doc)
}
