use crate::errors::ApiError;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use http::StatusCode;
use oauth_engine::wire::{ApplicationList, ApplicationPayload, ApplicationResponse, Pagination};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct ListParams {
    /// Number of applications to skip (default 0)
    offset: Option<i64>,
    /// Page size (default 20, max 100)
    limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/oauth/applications",
    tag = OAUTH_TAG,
    params(ListParams),
    responses(
        (status = 200, description = "A page of applications", body = ApplicationList),
        (status = 401, description = "Missing or invalid admin API key", body = ApiError)
    )
)]
pub(super) async fn list_applications(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ApplicationList>, ApiError> {
    let Query(params) = params?;
    let page = Pagination::new(params.offset, params.limit);
    Ok(Json(state.engine.applications().list(page).await?))
}

#[utoipa::path(
    get,
    path = "/oauth/applications/{id}",
    tag = OAUTH_TAG,
    params(("id" = i64, Path, description = "Application id")),
    responses(
        (status = 200, description = "The application", body = ApplicationResponse),
        (status = 404, description = "No such application", body = ApiError)
    )
)]
pub(super) async fn get_application(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.engine.applications().one(id).await?))
}

/// Register an application; client credentials are generated
#[utoipa::path(
    post,
    path = "/oauth/applications",
    tag = OAUTH_TAG,
    request_body = ApplicationPayload,
    responses(
        (status = 201, description = "Application registered", body = ApplicationResponse),
        (status = 422, description = "Missing or invalid fields", body = ApiError)
    )
)]
pub(super) async fn create_application(
    State(state): State<AppState>,
    payload: Result<Json<ApplicationPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ApplicationResponse>), ApiError> {
    let Json(payload) = payload?;
    let application = state.engine.applications().create(&payload).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// Update the description and scopes of an application
#[utoipa::path(
    put,
    path = "/oauth/applications/{id}",
    tag = OAUTH_TAG,
    params(("id" = i64, Path, description = "Application id")),
    request_body = ApplicationPayload,
    responses(
        (status = 200, description = "Application updated", body = ApplicationResponse),
        (status = 404, description = "No such application", body = ApiError)
    )
)]
pub(super) async fn update_application(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ApplicationPayload>, JsonRejection>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    Ok(Json(state.engine.applications().update(id, &payload).await?))
}

/// Revoke an application. Its credentials stop resolving immediately.
#[utoipa::path(
    delete,
    path = "/oauth/applications/{id}",
    tag = OAUTH_TAG,
    params(("id" = i64, Path, description = "Application id")),
    responses(
        (status = 204, description = "Application revoked"),
        (status = 404, description = "No such application, or already revoked", body = ApiError)
    )
)]
pub(super) async fn revoke_application(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.engine.applications().revoke(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
