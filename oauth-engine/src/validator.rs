//! Side-effect-free rule checks over requests and persisted credentials.
//!
//! Every check takes its inputs by reference and returns a typed verdict, so the same
//! input always produces the same result. Time-dependent checks receive `now` explicitly.

use chrono::{DateTime, Utc};

use crate::error::OAuthError;
use crate::models::{AccessGrant, AccessToken, Application, Expiring, OwnerType, RefreshToken};
use crate::scope;
use crate::wire::{AccessTokenRequest, ApplicationPayload, AuthorizationRequest};

/// Flow selected by `response_type` on the grant endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Code,
    Token,
}

impl ResponseType {
    pub fn parse(value: &str) -> Result<Self, OAuthError> {
        match value {
            "code" => Ok(ResponseType::Code),
            "token" => Ok(ResponseType::Token),
            other => Err(OAuthError::validation(format!(
                "unsupported response_type '{other}'"
            ))),
        }
    }
}

/// Flow selected by `grant_type` on the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, OAuthError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(OAuthError::validation(format!("{field} is required"))),
    }
}

pub fn validate_application_payload(payload: &ApplicationPayload) -> Result<OwnerType, OAuthError> {
    let owner_type = required(&payload.owner_type, "owner_type")?;
    owner_type
        .parse::<OwnerType>()
        .map_err(|_| OAuthError::validation("owner_type must be one of: confidential, public"))
}

/// Checks a grant request against the application it authenticated as.
///
/// The implicit flow is rejected for non-confidential applications before the scopes are
/// looked at, so the verdict does not depend on which scopes were asked for.
pub fn validate_authorization_grant(
    request: &AuthorizationRequest,
    application: &Application,
) -> Result<ResponseType, OAuthError> {
    let response_type = ResponseType::parse(required(&request.response_type, "response_type")?)?;
    required(&request.resource_owner_id, "resource_owner_id")?;
    required(&request.redirect_uri, "redirect_uri")?;

    if response_type == ResponseType::Token && application.owner_type != OwnerType::Confidential {
        return Err(OAuthError::forbidden(
            "response_type 'token' is only allowed for confidential applications",
        ));
    }

    let invalid = scope::missing(
        request.scopes.as_deref().unwrap_or_default(),
        &application.scopes,
    );
    if !invalid.is_empty() {
        return Err(OAuthError::InvalidScopes(invalid));
    }

    Ok(response_type)
}

/// `refresh_enabled` mirrors the refresh-token feature flag; when it is off the
/// `refresh_token` grant type is as unknown as any other.
pub fn validate_token_grant(
    request: &AccessTokenRequest,
    refresh_enabled: bool,
) -> Result<GrantType, OAuthError> {
    match required(&request.grant_type, "grant_type")? {
        "authorization_code" => {
            required(&request.code, "code")?;
            required(&request.redirect_uri, "redirect_uri")?;
            Ok(GrantType::AuthorizationCode)
        }
        "refresh_token" if refresh_enabled => {
            required(&request.refresh_token, "refresh_token")?;
            Ok(GrantType::RefreshToken)
        }
        other => Err(OAuthError::validation(format!(
            "unsupported grant_type '{other}'"
        ))),
    }
}

pub fn validate_authorization_code_redemption(
    request: &AccessTokenRequest,
    grant: &AccessGrant,
    application: &Application,
    now: DateTime<Utc>,
) -> Result<(), OAuthError> {
    if grant.application_id != application.id {
        return Err(OAuthError::forbidden(
            "authorization code was issued to another application",
        ));
    }
    if grant.is_revoked() {
        return Err(OAuthError::forbidden("authorization code already used"));
    }
    if grant.is_expired(now) {
        return Err(OAuthError::forbidden("authorization code expired"));
    }
    if request.redirect_uri.as_deref() != Some(grant.redirect_uri.as_str()) {
        return Err(OAuthError::forbidden("redirect_uri does not match"));
    }
    Ok(())
}

pub fn validate_refresh_token_redemption(
    refresh_token: &RefreshToken,
    now: DateTime<Utc>,
) -> Result<(), OAuthError> {
    if refresh_token.is_revoked() {
        return Err(OAuthError::forbidden("refresh token already used"));
    }
    if refresh_token.is_expired(now) {
        return Err(OAuthError::forbidden("refresh token expired"));
    }
    Ok(())
}

/// The access token behind a refresh token must belong to the redeeming application
pub fn validate_token_ownership(
    access_token: &AccessToken,
    application: &Application,
) -> Result<(), OAuthError> {
    if access_token.application_id != application.id {
        return Err(OAuthError::forbidden(
            "refresh token was issued to another application",
        ));
    }
    Ok(())
}
