use crate::interceptors::InterceptError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use log::warn;
use oauth_engine::{ErrorKind, OAuthError};
use serde::Serialize;
use utoipa::ToSchema;

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// Stable machine-readable code
    pub code: String,
    pub message: String,
    /// Present on internal errors; the matching server log line carries the cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a code, message and status code
    pub fn new(code: impl Into<String>, message: impl ToString, status_code: StatusCode) -> Self {
        Self {
            code: code.into(),
            message: message.to_string(),
            trace_id: None,
            status_code,
        }
    }

    /// Create new Unauthorized (401) with a detail message
    pub fn unauthorized(message: impl ToString) -> Self {
        Self::new("unauthorized", message, StatusCode::UNAUTHORIZED)
    }

    /// Create new Bad Gateway (502) with a detail message
    pub fn bad_gateway(message: impl ToString) -> Self {
        Self::new("bad_gateway", message, StatusCode::BAD_GATEWAY)
    }

    pub fn route_not_found(path: &str) -> Self {
        Self::new(
            "route_not_found",
            format!("no route matches {path}"),
            StatusCode::NOT_FOUND,
        )
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        let kind = err.kind();
        let status_code = match kind {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if kind != ErrorKind::Internal {
            warn!("Request rejected: {err}");
        }
        Self {
            code: kind.code().to_string(),
            message: err.to_string(),
            trace_id: err.trace_id().map(str::to_string),
            status_code,
        }
    }
}

impl From<InterceptError> for ApiError {
    fn from(err: InterceptError) -> Self {
        Self::new(err.code(), &err, err.status())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let code = match rejection {
            JsonRejection::JsonDataError(_) => "validation_error",
            _ => "malformed_request",
        };
        warn!("Rejected request body: {}", rejection.body_text());
        Self::new(code, rejection.body_text(), rejection.status())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            "malformed_request",
            rejection.body_text(),
            StatusCode::BAD_REQUEST,
        )
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(
            "malformed_request",
            rejection.body_text(),
            StatusCode::BAD_REQUEST,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        (status_code, Json(self)).into_response()
    }
}
