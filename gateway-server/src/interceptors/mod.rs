//! Request interceptors run by the proxy before the upstream hop.
//!
//! Each interceptor only acts on routes whose `auth` mode it owns and passes every other
//! request through untouched. A returned [`InterceptError`] aborts the request.

mod application_credential;
mod bearer_token;

pub use application_credential::ApplicationCredentialInterceptor;
pub use bearer_token::BearerTokenInterceptor;

use crate::routes::Route;
use async_trait::async_trait;
use axum::body::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use log::warn;
use oauth_engine::OAuthEngine;
use std::sync::Arc;
use thiserror::Error;

/// Resource owner the presented access token was issued for
pub const RESOURCE_OWNER_ID_HEADER: HeaderName = HeaderName::from_static("x-resource-owner-id");
/// Application the presented credential belongs to
pub const APPLICATION_ID_HEADER: HeaderName = HeaderName::from_static("x-application-id");

/// Headers only the gateway may set on a proxied request
pub const IDENTITY_HEADERS: [HeaderName; 2] = [RESOURCE_OWNER_ID_HEADER, APPLICATION_ID_HEADER];

/// An in-flight request, buffered so interceptors can read the body
#[derive(Debug)]
pub struct ProxiedRequest {
    pub parts: Parts,
    pub body: Bytes,
    pub route: Arc<Route>,
}

impl ProxiedRequest {
    pub fn new(parts: Parts, body: Bytes, route: Arc<Route>) -> Self {
        Self { parts, body, route }
    }

    /// Removes identity headers a client may have sent itself
    pub fn strip_identity(&mut self) {
        for name in IDENTITY_HEADERS.iter() {
            self.parts.headers.remove(name);
        }
    }

    pub(crate) fn set_identity(&mut self, name: HeaderName, value: &str) {
        set_header(&mut self.parts.headers, name, value);
    }
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("Not forwarding {name}: value is not a valid header"),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterceptError {
    #[error("missing or malformed bearer token")]
    InvalidBearerFormat,

    #[error("access token not found")]
    TokenNotFound,

    #[error("access token expired")]
    TokenExpired,

    #[error("access token revoked")]
    TokenRevoked,

    #[error("access token lacks required scopes: {}", .0.join(" "))]
    InsufficientScope(Vec<String>),

    #[error("request body is required")]
    MissingBody,

    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("client_uid and client_secret are required")]
    MissingCredentials,

    #[error("application not found")]
    ApplicationNotFound,

    #[error("credential store unavailable")]
    Unavailable,
}

impl InterceptError {
    pub fn status(&self) -> StatusCode {
        match self {
            InterceptError::InvalidBearerFormat
            | InterceptError::TokenNotFound
            | InterceptError::TokenExpired
            | InterceptError::TokenRevoked
            | InterceptError::ApplicationNotFound => StatusCode::UNAUTHORIZED,
            InterceptError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            InterceptError::MissingBody | InterceptError::MissingCredentials => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            InterceptError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            InterceptError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            InterceptError::InvalidBearerFormat => "invalid_bearer_format",
            InterceptError::TokenNotFound => "token_not_found",
            InterceptError::TokenExpired => "token_expired",
            InterceptError::TokenRevoked => "token_revoked",
            InterceptError::InsufficientScope(_) => "insufficient_scope",
            InterceptError::MissingBody => "missing_body",
            InterceptError::MalformedBody(_) => "malformed_body",
            InterceptError::MissingCredentials => "missing_credentials",
            InterceptError::ApplicationNotFound => "application_not_found",
            InterceptError::Unavailable => "service_unavailable",
        }
    }
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn intercept(&self, request: &mut ProxiedRequest) -> Result<(), InterceptError>;
}

/// The interceptor chain, assembled once at startup
#[derive(Clone)]
pub struct Interceptors {
    chain: Vec<Arc<dyn Interceptor>>,
}

impl Interceptors {
    pub fn new(chain: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { chain }
    }

    /// The OAuth interceptors backed by the engine's stores
    pub fn oauth(engine: &OAuthEngine) -> Self {
        let service = engine.service();
        Self::new(vec![
            Arc::new(BearerTokenInterceptor::new(service.access_tokens().clone())),
            Arc::new(ApplicationCredentialInterceptor::new(
                service.applications().clone(),
            )),
        ])
    }

    /// Runs every interceptor in order, stopping at the first abort
    pub async fn run(&self, request: &mut ProxiedRequest) -> Result<(), InterceptError> {
        request.strip_identity();
        for interceptor in &self.chain {
            if let Err(err) = interceptor.intercept(request).await {
                warn!(
                    "{} rejected {} {} (route '{}'): {}",
                    interceptor.name(),
                    request.parts.method,
                    request.parts.uri.path(),
                    request.route.name,
                    err
                );
                return Err(err);
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::routes::AuthMode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(InterceptError::InvalidBearerFormat.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(InterceptError::TokenRevoked.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            InterceptError::InsufficientScope(vec!["users".to_string()]).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(InterceptError::MissingBody.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            InterceptError::MalformedBody("eof".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(InterceptError::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_spoofed_identity_headers_are_stripped() {
        let engine = engine().await;
        let interceptors = Interceptors::oauth(&engine);
        let mut request = request(
            route(AuthMode::None, None),
            &[("x-resource-owner-id", "admin"), ("x-application-id", "1")],
            b"",
        );

        interceptors.run(&mut request).await.unwrap();
        assert!(request.parts.headers.get(&RESOURCE_OWNER_ID_HEADER).is_none());
        assert!(request.parts.headers.get(&APPLICATION_ID_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_rejection() {
        let engine = engine().await;
        let interceptors = Interceptors::oauth(&engine);
        let mut request = request(route(AuthMode::OAuth, None), &[], b"");

        assert_eq!(
            interceptors.run(&mut request).await,
            Err(InterceptError::InvalidBearerFormat)
        );
    }
}
