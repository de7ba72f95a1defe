use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;

/// Requires `Authorization: Bearer <admin.api_key>` when an admin key is configured
pub(crate) async fn admin_authentication(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin.api_key.as_deref() else {
        return next.run(request).await;
    };

    // Extract the authorization header
    let auth_header = match request.headers().get(http::header::AUTHORIZATION) {
        Some(header) => header,
        None => {
            warn!("Missing Authorization header");
            return ApiError::unauthorized("Missing Authorization header").into_response();
        }
    };

    let api_key = match auth_header.to_str() {
        Ok(header_str) if header_str.len() > 7 && header_str[..7].eq_ignore_ascii_case("bearer ") => {
            &header_str[7..]
        }
        Ok(_) => {
            warn!("Invalid Authorization header format, missing 'Bearer ' prefix");
            return ApiError::unauthorized("Invalid Authorization header format").into_response();
        }
        Err(e) => {
            warn!("Failed to parse Authorization header to string: {}", e);
            return ApiError::unauthorized("Invalid Authorization header format").into_response();
        }
    };

    if api_key != expected {
        warn!("Authentication failed: Invalid admin API key");
        return ApiError::unauthorized("Invalid admin API key").into_response();
    }
    next.run(request).await
}
