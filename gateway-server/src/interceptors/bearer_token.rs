use super::{
    InterceptError, Interceptor, ProxiedRequest, APPLICATION_ID_HEADER, RESOURCE_OWNER_ID_HEADER,
};
use crate::routes::AuthMode;
use async_trait::async_trait;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::{debug, error};
use oauth_engine::models::Expiring;
use oauth_engine::scope;
use oauth_engine::store::{AccessTokenStore, TxScope};
use oauth_engine::StoreError;
use std::sync::Arc;

/// Guards `auth: oauth` routes with an access token
pub struct BearerTokenInterceptor {
    tokens: Arc<dyn AccessTokenStore>,
}

impl BearerTokenInterceptor {
    pub fn new(tokens: Arc<dyn AccessTokenStore>) -> Self {
        Self { tokens }
    }
}

/// Extracts `<token>` from `Authorization: Bearer <token>`
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, InterceptError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(InterceptError::InvalidBearerFormat)?
        .to_str()
        .map_err(|_| InterceptError::InvalidBearerFormat)?;

    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() || token.contains(' ') {
                Err(InterceptError::InvalidBearerFormat)
            } else {
                Ok(token)
            }
        }
        _ => Err(InterceptError::InvalidBearerFormat),
    }
}

#[async_trait]
impl Interceptor for BearerTokenInterceptor {
    fn name(&self) -> &'static str {
        "bearer-token"
    }

    async fn intercept(&self, request: &mut ProxiedRequest) -> Result<(), InterceptError> {
        if request.route.auth != AuthMode::OAuth {
            return Ok(());
        }

        let token = bearer_token(&request.parts.headers)?;
        let token = match self.tokens.one_by_token(token, TxScope::Pool).await {
            Ok(token) => token,
            Err(StoreError::NotFound) => return Err(InterceptError::TokenNotFound),
            Err(err) => {
                error!("Access token lookup failed: {err}");
                return Err(InterceptError::Unavailable);
            }
        };

        if token.is_revoked() {
            return Err(InterceptError::TokenRevoked);
        }
        if token.is_expired(Utc::now()) {
            return Err(InterceptError::TokenExpired);
        }

        let missing = scope::missing(
            request.route.scope.as_deref().unwrap_or_default(),
            &token.scopes,
        );
        if !missing.is_empty() {
            return Err(InterceptError::InsufficientScope(missing));
        }

        debug!(
            "Access token {} accepted for route '{}'",
            token.id, request.route.name
        );
        request.set_identity(RESOURCE_OWNER_ID_HEADER, &token.resource_owner_id);
        request.set_identity(APPLICATION_ID_HEADER, &token.application_id.to_string());
        Ok(())
    }
}
