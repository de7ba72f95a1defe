use crate::config::GatewayConfig;
use crate::create_app;
use crate::routes::RouteTable;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use oauth_engine::wire::{
    AccessTokenResponse, ApplicationPayload, ApplicationResponse, Authorization,
    AuthorizationRequest,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::MockServer;

/// Test fixture for setting up a complete gateway with a mocked upstream service.
///
/// The fixture runs against a private in-memory database and a route table whose routes all
/// point at `upstream_mock`:
///
/// | route    | path         | auth                |
/// |----------|--------------|---------------------|
/// | `public` | `/public`    | `none`              |
/// | `users`  | `/api/users` | `oauth`, scope `users` |
/// | `api`    | `/api`       | `oauth`             |
/// | `login`  | `/login`     | `oauth_application` |
/// | `dead`   | `/dead`      | `none`, unreachable upstream |
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     Mock::given(matchers::method("GET"))
///         .and(matchers::path("/public/items"))
///         .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
///         .mount(&fixture.upstream_mock)
///         .await;
///
///     fixture.get("/public/items").await.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Shared state behind the router
    pub state: AppState,
    /// Configuration settings
    pub config: GatewayConfig,
    /// Mock server standing in for every upstream
    pub upstream_mock: MockServer,
}

impl TestFixture {
    /// Creates a new test fixture with a mock upstream.
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let upstream_mock = MockServer::start().await;
        let config = GatewayConfig::for_test();
        let routes = RouteTable::from_yaml(&format!(
            r#"
routes:
  - name: public
    path: /public
    upstream: {upstream}
  - name: users
    path: /api/users
    upstream: {upstream}
    auth: oauth
    scope: users
  - name: api
    path: /api
    upstream: {upstream}
    auth: oauth
  - name: login
    path: /login
    upstream: {upstream}
    auth: oauth_application
  - name: dead
    path: /dead
    upstream: http://127.0.0.1:1
"#,
            upstream = upstream_mock.uri()
        ))
        .expect("Failed to parse test routes");

        let state = AppState::for_testing(config.clone(), routes).await;
        let app = create_app(state.clone());

        Self {
            app,
            state,
            config,
            upstream_mock,
        }
    }

    /// Initializes the test logger with customized settings.
    ///
    /// Called by `TestFixture::new()` with `Debug`; call it first with another level for
    /// noisier or quieter output.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Registers an application directly through the engine, scopes `public users`.
    pub async fn register_application(&self, owner_type: &str) -> ApplicationResponse {
        self.state
            .engine
            .applications()
            .create(&ApplicationPayload {
                owner_id: Some("owner-1".to_string()),
                owner_type: Some(owner_type.to_string()),
                description: None,
                scopes: Some("public users".to_string()),
            })
            .await
            .expect("Failed to register application")
    }

    /// Issues an access token for `user-42` with the given scopes through the implicit flow
    /// of a fresh confidential application.
    pub async fn issue_token(&self, scopes: &str) -> AccessTokenResponse {
        let app = self.register_application("confidential").await;
        let issued = self
            .state
            .engine
            .service()
            .grantor(&AuthorizationRequest {
                response_type: Some("token".to_string()),
                resource_owner_id: Some("user-42".to_string()),
                client_uid: Some(app.client_uid),
                client_secret: Some(app.client_secret),
                redirect_uri: Some("https://app.example/callback".to_string()),
                scopes: Some(scopes.to_string()),
            })
            .await
            .expect("Failed to issue token");
        match issued {
            Authorization::Token(token) => token,
            Authorization::Grant(_) => panic!("Expected an access token"),
        }
    }

    /// Creates a request builder with a JSON content type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let request = fixture.request_builder(Method::POST, "/login")
    ///     .header("X-Custom-Header", "value")
    ///     .body(Body::from(json_body))
    ///     .expect("Failed to build request");
    ///
    /// let response = fixture.send(request).await;
    /// ```
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    /// Sends a GET request to the specified URI.
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    /// Sends a GET request with custom headers.
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::GET, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let response = fixture
    ///     .post("/oauth/authorizations/revoke", &json!({ "token": token }))
    ///     .await;
    /// response.assert_ok();
    /// ```
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a raw, possibly invalid, body.
    pub async fn post_raw(&self, uri: impl AsRef<str>, body: &'static str) -> TestResponse {
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request authenticated with the admin API key, with an optional JSON body.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let response = fixture
    ///     .admin::<()>(Method::GET, "/oauth/applications", None)
    ///     .await;
    /// response.assert_ok();
    /// ```
    pub async fn admin<T: Serialize>(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        body: Option<&T>,
    ) -> TestResponse {
        let api_key = self
            .config
            .admin
            .api_key
            .as_deref()
            .expect("Test config has an admin key");
        let body = match body {
            Some(body) => {
                Body::from(serde_json::to_vec(body).expect("Failed to serialize body to JSON"))
            }
            None => Body::empty(),
        };
        let request = self
            .request_builder(method, uri)
            .header("Authorization", format!("Bearer {api_key}"))
            .body(body)
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    ///
    /// This is the lower-level method behind the convenience methods.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

/// Response from a test request that provides convenient access to status and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: http::HeaderMap,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Asserts that a response header has the expected value.
    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let actual = self
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok());
        assert_eq!(actual, Some(expected), "Unexpected value for header {name}");
        self
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if the body does not deserialize into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).unwrap_or_else(|e| {
            panic!(
                "Failed to deserialize response body: {e}\nBody: {}",
                serde_json::to_string_pretty(&self.json).unwrap_or_default()
            )
        })
    }
}
