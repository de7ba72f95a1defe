use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "OAuth2 authorization and application management endpoints"),
    ),
    info(
        title = "API Gateway",
        description = "API gateway with an embedded OAuth2 authorization server",
        version = "1.0.0"
    )
)]
pub(crate) struct ApiDoc;
