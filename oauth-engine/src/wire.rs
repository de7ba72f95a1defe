//! Request and response shapes exchanged over HTTP.
//!
//! Optional inputs are `Option` so that a missing field can be told apart from an empty one,
//! and optional outputs are skipped instead of rendered as `null`.

use crate::models::OwnerType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Input of the grant endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationRequest {
    /// `code` for the authorization-code flow, `token` for the implicit flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Requested scopes, space-delimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
}

/// Input of the token endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenRequest {
    /// `authorization_code` or `refresh_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// Input of the revoke endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RevokeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Body of application create and update calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ApplicationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// `confidential` or `public`; required on create, ignored on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApplicationResponse {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub owner_type: OwnerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scopes: String,
    pub client_uid: String,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GrantResponse {
    pub id: i64,
    pub application_id: i64,
    pub resource_owner_id: String,
    pub scopes: String,
    pub code: String,
    pub redirect_uri: String,
    /// Seconds until the code expires
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub id: i64,
    pub application_id: i64,
    pub resource_owner_id: String,
    pub token: String,
    /// Always `Bearer`
    pub token_type: String,
    pub scopes: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Result of the grant endpoint, depending on the requested response type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Authorization {
    Grant(GrantResponse),
    Token(AccessTokenResponse),
}

/// Offset/limit window over a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamps caller-supplied values into a usable window
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            offset: offset.unwrap_or(0).max(0),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    pub offset: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApplicationList {
    pub items: Vec<ApplicationResponse>,
    pub meta: PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_stay_absent() {
        let request: AuthorizationRequest =
            serde_json::from_value(json!({"response_type": "code"})).unwrap();
        assert_eq!(request.response_type.as_deref(), Some("code"));
        assert!(request.scopes.is_none());

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"response_type": "code"}));
    }

    #[test]
    fn test_pagination_clamping() {
        assert_eq!(Pagination::new(None, None), Pagination { offset: 0, limit: 20 });
        assert_eq!(
            Pagination::new(Some(-5), Some(1000)),
            Pagination { offset: 0, limit: 100 }
        );
        assert_eq!(Pagination::new(Some(40), Some(0)), Pagination { offset: 40, limit: 1 });
    }
}
