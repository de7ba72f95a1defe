use crate::errors::ApiError;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use http::StatusCode;
use oauth_engine::wire::{
    AccessTokenRequest, AccessTokenResponse, Authorization, AuthorizationRequest, RevokeRequest,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Confirmation returned by the revoke endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct RevokeResponse {
    message: String,
}

/// Issue an authorization code (`response_type=code`) or, for confidential applications,
/// an access token directly (`response_type=token`)
#[utoipa::path(
    post,
    path = "/oauth/authorizations",
    tag = OAUTH_TAG,
    request_body = AuthorizationRequest,
    responses(
        (status = 201, description = "Grant or access token issued", body = Authorization),
        (status = 403, description = "Scopes or flow not allowed for the application", body = ApiError),
        (status = 404, description = "Unknown client credentials", body = ApiError),
        (status = 422, description = "Missing or invalid fields", body = ApiError)
    )
)]
pub(super) async fn authorize(
    State(state): State<AppState>,
    payload: Result<Json<AuthorizationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Authorization>), ApiError> {
    let Json(request) = payload?;
    let authorization = state.engine.service().grantor(&request).await?;
    Ok((StatusCode::CREATED, Json(authorization)))
}

/// Exchange an authorization code or a refresh token for an access token
#[utoipa::path(
    post,
    path = "/oauth/authorizations/token",
    tag = OAUTH_TAG,
    request_body = AccessTokenRequest,
    responses(
        (status = 201, description = "Access token issued", body = AccessTokenResponse),
        (status = 403, description = "Code or refresh token already used, expired or foreign", body = ApiError),
        (status = 404, description = "Unknown client, code or refresh token", body = ApiError),
        (status = 422, description = "Missing or invalid fields", body = ApiError)
    )
)]
pub(super) async fn token(
    State(state): State<AppState>,
    payload: Result<Json<AccessTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccessTokenResponse>), ApiError> {
    let Json(request) = payload?;
    let token = state.engine.service().token(&request).await?;
    Ok((StatusCode::CREATED, Json(token)))
}

/// Revoke an access token
#[utoipa::path(
    post,
    path = "/oauth/authorizations/revoke",
    tag = OAUTH_TAG,
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Token revoked", body = RevokeResponse),
        (status = 404, description = "Unknown or already revoked token", body = ApiError),
        (status = 422, description = "Missing token", body = ApiError)
    )
)]
pub(super) async fn revoke(
    State(state): State<AppState>,
    payload: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let Json(request) = payload?;
    state.engine.service().revoke_token(&request).await?;
    Ok(Json(RevokeResponse {
        message: "token revoked".to_string(),
    }))
}
