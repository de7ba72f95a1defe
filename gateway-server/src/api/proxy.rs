use crate::errors::ApiError;
use crate::interceptors::ProxiedRequest;
use crate::routes::has_dot_segment;
use crate::state::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request, Response},
    response::IntoResponse,
};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderName, StatusCode};
use http_body_util::LengthLimitError;
use std::error::Error as StdError;

/// Headers that describe a single hop and are never copied across the proxy
fn is_hop_header(name: &HeaderName) -> bool {
    [CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING].contains(name)
}

/// Route a request through the route table: match, intercept, forward
pub(super) async fn proxy_request(State(state): State<AppState>, req: Request<Body>) -> Response<Body> {
    if has_dot_segment(req.uri().path()) {
        log::warn!("Rejecting path with dot segments: {}", req.uri().path());
        return ApiError::new(
            "invalid_path",
            "path must not contain '.' or '..' segments",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }

    let Some(route) = state.routes.find(req.method(), req.uri().path()) else {
        log::debug!("No route for {} {}", req.method(), req.uri().path());
        return ApiError::route_not_found(req.uri().path()).into_response();
    };

    let (parts, body) = req.into_parts();
    let body = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) if e.source().is_some_and(|source| source.is::<LengthLimitError>()) => {
            log::warn!(
                "Request body for route '{}' exceeds {} bytes",
                route.name,
                state.config.max_body_bytes
            );
            return ApiError::new(
                "payload_too_large",
                format!("request body exceeds {} bytes", state.config.max_body_bytes),
                StatusCode::PAYLOAD_TOO_LARGE,
            )
            .into_response();
        }
        Err(e) => {
            log::warn!("Failed to read request body: {}", e);
            return ApiError::new(
                "malformed_request",
                "Failed to read request body",
                StatusCode::BAD_REQUEST,
            )
            .into_response();
        }
    };

    let mut request = ProxiedRequest::new(parts, body, route);
    if let Err(err) = state.interceptors.run(&mut request).await {
        return ApiError::from(err).into_response();
    }
    forward(&state, request).await
}

async fn forward(state: &AppState, request: ProxiedRequest) -> Response<Body> {
    let ProxiedRequest { parts, body, route } = request;
    let url = route.upstream_url(parts.uri.path(), parts.uri.query());
    log::debug!(
        "Forwarding {} {} to {} (route '{}')",
        parts.method,
        parts.uri.path(),
        url,
        route.name
    );

    let mut req_builder = state.upstream_client.request(parts.method.clone(), &url);
    for (key, value) in parts.headers.iter() {
        if !is_hop_header(key) {
            req_builder = req_builder.header(key, value);
        }
    }
    if !body.is_empty() {
        req_builder = req_builder.body(body);
    }

    match req_builder.send().await {
        Ok(response) => {
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::error!("Failed to read upstream response body from {}: {}", url, e);
                    return ApiError::bad_gateway("Failed to read upstream response body")
                        .into_response();
                }
            };

            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            for (key, value) in headers.iter() {
                if !is_hop_header(key) {
                    resp.headers_mut().append(key, value.clone());
                }
            }
            resp
        }
        Err(e) => {
            log::error!(
                "Failed to reach upstream for route '{}': {}\nURL: {}\nSource error: {:?}",
                route.name,
                e,
                url,
                e.source()
            );

            let error_message = if e.is_timeout() {
                "Request timed out while waiting for the upstream service"
            } else if e.is_connect() {
                "Connection error occurred while connecting to the upstream service"
            } else {
                "Failed to send request to the upstream service"
            };
            ApiError::bad_gateway(error_message).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::{matchers, Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_forward_public_route() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/public/items"))
            .and(matchers::query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "items": [] }))
                    .insert_header("X-Response", "test"),
            )
            .expect(1)
            .mount(&fixture.upstream_mock)
            .await;

        let response = fixture.get("/public/items?page=2").await;
        response.assert_ok();
        response.assert_header("X-Response", "test");
        assert_eq!(response.json, json!({ "items": [] }));

        fixture.upstream_mock.verify().await;
    }

    #[tokio::test]
    async fn test_forward_with_body() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/public/echo"))
            .respond_with(|req: &wiremock::Request| {
                ResponseTemplate::new(201).set_body_bytes(req.body.clone())
            })
            .expect(1)
            .mount(&fixture.upstream_mock)
            .await;

        let response = fixture.post("/public/echo", &json!({ "hello": "world" })).await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json, json!({ "hello": "world" }));
    }

    #[tokio::test]
    async fn test_upstream_status_is_passed_through() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::any())
            .and(matchers::path("/public/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "nope" })))
            .mount(&fixture.upstream_mock)
            .await;

        let response = fixture.get("/public/missing").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json, json!({ "error": "nope" }));
    }

    #[tokio::test]
    async fn test_unmatched_route() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/nowhere").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json["code"], "route_not_found");
    }

    #[tokio::test]
    async fn test_dot_segments_are_rejected() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fixture.upstream_mock)
            .await;

        // Would resolve to the scoped users route upstream
        for path in ["/public/../api/users/me", "/public/%2e%2e/api/users/me", "/public/./items"] {
            let response = fixture.get(path).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json["code"], "invalid_path", "{path}");
        }

        fixture.upstream_mock.verify().await;
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fixture.upstream_mock)
            .await;

        let body = "x".repeat(fixture.config.max_body_bytes + 1);
        let response = fixture
            .send(
                fixture
                    .request_builder(Method::POST, "/public/upload")
                    .body(axum::body::Body::from(body))
                    .expect("Failed to build request"),
            )
            .await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.json["code"], "payload_too_large");

        fixture.upstream_mock.verify().await;
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/dead/anything").await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(response.json["code"], "bad_gateway");
    }

    #[tokio::test]
    async fn test_bearer_route_injects_identity() {
        let fixture = TestFixture::new().await;
        let token = fixture.issue_token("public users").await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/users/me"))
            .and(matchers::header("x-resource-owner-id", "user-42"))
            .and(matchers::header_exists("x-application-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "user-42" })))
            .expect(1)
            .mount(&fixture.upstream_mock)
            .await;

        let bearer = format!("Bearer {}", token.token);
        let response = fixture
            .get_with_headers(
                "/api/users/me",
                &[("Authorization", bearer.as_str()), ("x-resource-owner-id", "admin")],
            )
            .await;
        response.assert_ok();
        fixture.upstream_mock.verify().await;
    }

    #[tokio::test]
    async fn test_bearer_route_rejections() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fixture.upstream_mock)
            .await;

        let response = fixture.get("/api/orders").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["code"], "invalid_bearer_format");

        fixture
            .get_with_headers("/api/orders", &[("Authorization", "Bearer unknown")])
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // The users route needs the `users` scope
        let token = fixture.issue_token("public").await;
        let bearer = format!("Bearer {}", token.token);
        let response = fixture
            .get_with_headers("/api/users/me", &[("Authorization", bearer.as_str())])
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json["code"], "insufficient_scope");

        fixture.upstream_mock.verify().await;
    }

    #[tokio::test]
    async fn test_application_route() {
        let fixture = TestFixture::new().await;
        let app = fixture.register_application("public").await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/login"))
            .and(matchers::header("x-application-id", app.id.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session": "s" })))
            .expect(1)
            .mount(&fixture.upstream_mock)
            .await;

        let response = fixture
            .post(
                "/login",
                &json!({ "client_uid": app.client_uid, "client_secret": app.client_secret }),
            )
            .await;
        response.assert_ok();

        fixture
            .post("/login", &json!({ "client_uid": app.client_uid }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        fixture
            .post_raw("/login", "not json")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        fixture
            .send(
                fixture
                    .request_builder(Method::POST, "/login")
                    .body(axum::body::Body::empty())
                    .expect("Failed to build request"),
            )
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        fixture.upstream_mock.verify().await;
    }

    // Revoked tokens stop passing the bearer interceptor
    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let fixture = TestFixture::new().await;
        let token = fixture.issue_token("public").await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&fixture.upstream_mock)
            .await;

        let bearer = format!("Bearer {}", token.token);
        fixture
            .get_with_headers("/api/orders", &[("Authorization", bearer.as_str())])
            .await
            .assert_ok();

        fixture
            .post("/oauth/authorizations/revoke", &json!({ "token": token.token }))
            .await
            .assert_ok();

        let response = fixture
            .get_with_headers("/api/orders", &[("Authorization", bearer.as_str())])
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["code"], "token_revoked");

        fixture.upstream_mock.verify().await;
    }
}
