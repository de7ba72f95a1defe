use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Basic health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    status: &'static str,
    /// Reachability of the OAuth database, reported by `/ready`
    #[serde(skip_serializing_if = "Option::is_none")]
    database_status: Option<&'static str>,
    #[serde(skip)]
    status_code: StatusCode,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

/// Liveness: the process is up and serving
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is healthy", body = Health)
    )
)]
async fn health_check() -> Health {
    Health {
        status: "ok",
        database_status: None,
        status_code: StatusCode::OK,
    }
}

/// Readiness: the OAuth database answers
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = Health),
        (status = 503, description = "Service is not ready", body = Health)
    )
)]
async fn ready_check(State(state): State<AppState>) -> Health {
    if state.health_check().await {
        Health {
            status: "ok",
            database_status: Some("healthy"),
            status_code: StatusCode::OK,
        }
    } else {
        Health {
            status: "error",
            database_status: Some("unreachable"),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(health_check))
        .routes(routes!(ready_check))
}

#[cfg(test)]
mod test {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_endpoint() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/health").await;
        response.assert_ok();
        assert_eq!(response.json, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_ready_endpoint() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/ready").await;
        response.assert_ok();
        assert_eq!(
            response.json,
            json!({ "status": "ok", "database_status": "healthy" })
        );
    }

    #[tokio::test]
    async fn test_ready_reports_unreachable_database() {
        let fixture = TestFixture::new().await;
        fixture.state.engine.database().pool().close().await;

        let response = fixture.get("/ready").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json["database_status"], "unreachable");
    }
}
