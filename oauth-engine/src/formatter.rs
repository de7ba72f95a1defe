//! Mapping between wire shapes and persisted records.
//!
//! Everything here is pure: the current time is passed in and the only source of
//! non-determinism is the random credential generator.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

use crate::models::{
    AccessGrant, AccessToken, Application, ApplicationChanges, NewAccessGrant, NewAccessToken,
    NewApplication, NewRefreshToken, OwnerType, RefreshToken,
};
use crate::wire::{
    AccessTokenResponse, ApplicationPayload, ApplicationResponse, AuthorizationRequest,
    GrantResponse,
};

pub const TOKEN_TYPE: &str = "Bearer";

/// Number of random bytes behind every code, token and client secret
const CREDENTIAL_BYTES: usize = 32;

/// Generates an opaque credential: 256 random bits, base64url without padding
pub fn generate_token() -> String {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `now + ttl`, saturating at the largest representable instant
pub fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds left before `expires_in`, never negative
pub fn seconds_until(expires_in: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_in - now).num_seconds().max(0)
}

/// Converts a configured lifetime, saturating values chrono cannot represent
pub fn lifetime(ttl: std::time::Duration) -> Duration {
    Duration::from_std(ttl).unwrap_or(Duration::MAX)
}

/// Lifetimes of the credentials the engine issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    pub access_token: Duration,
    pub authorization_code: Duration,
    pub refresh_token: Duration,
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            access_token: Duration::hours(24),
            authorization_code: Duration::minutes(10),
            refresh_token: Duration::hours(720),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    lifetimes: Lifetimes,
}

impl Formatter {
    pub fn new(lifetimes: Lifetimes) -> Self {
        Self { lifetimes }
    }

    pub fn lifetimes(&self) -> &Lifetimes {
        &self.lifetimes
    }

    /// Insertable grant for a validated authorization request
    pub fn new_access_grant(
        &self,
        request: &AuthorizationRequest,
        application: &Application,
        now: DateTime<Utc>,
    ) -> NewAccessGrant {
        NewAccessGrant {
            application_id: application.id,
            resource_owner_id: request.resource_owner_id.clone().unwrap_or_default(),
            scopes: request.scopes.clone().unwrap_or_default(),
            code: generate_token(),
            redirect_uri: request.redirect_uri.clone().unwrap_or_default(),
            expires_in: expiry(now, self.lifetimes.authorization_code),
            created_at: now,
        }
    }

    /// Insertable token for the implicit flow
    pub fn access_token_from_request(
        &self,
        request: &AuthorizationRequest,
        application: &Application,
        now: DateTime<Utc>,
    ) -> NewAccessToken {
        self.new_access_token(
            application.id,
            request.resource_owner_id.clone().unwrap_or_default(),
            request.scopes.clone().unwrap_or_default(),
            now,
        )
    }

    /// Insertable token carrying over the owner and scopes of a redeemed grant
    pub fn access_token_from_grant(&self, grant: &AccessGrant, now: DateTime<Utc>) -> NewAccessToken {
        self.new_access_token(
            grant.application_id,
            grant.resource_owner_id.clone(),
            grant.scopes.clone(),
            now,
        )
    }

    /// Insertable token replacing one whose refresh token is being redeemed
    pub fn access_token_from_token(&self, old: &AccessToken, now: DateTime<Utc>) -> NewAccessToken {
        self.new_access_token(
            old.application_id,
            old.resource_owner_id.clone(),
            old.scopes.clone(),
            now,
        )
    }

    fn new_access_token(
        &self,
        application_id: i64,
        resource_owner_id: String,
        scopes: String,
        now: DateTime<Utc>,
    ) -> NewAccessToken {
        NewAccessToken {
            application_id,
            resource_owner_id,
            token: generate_token(),
            scopes,
            expires_in: expiry(now, self.lifetimes.access_token),
            created_at: now,
        }
    }

    pub fn new_refresh_token(&self, access_token_id: i64, now: DateTime<Utc>) -> NewRefreshToken {
        NewRefreshToken {
            access_token_id,
            token: generate_token(),
            expires_in: expiry(now, self.lifetimes.refresh_token),
            created_at: now,
        }
    }
}

/// Insertable application with freshly generated credentials
pub fn new_application(
    payload: &ApplicationPayload,
    owner_type: OwnerType,
    now: DateTime<Utc>,
) -> NewApplication {
    NewApplication {
        owner_id: payload.owner_id.clone(),
        owner_type,
        description: payload.description.clone(),
        scopes: payload.scopes.clone().unwrap_or_default(),
        client_uid: uuid::Uuid::new_v4().simple().to_string(),
        client_secret: generate_token(),
        created_at: now,
    }
}

/// Only description and scopes are mutable; credentials and owner never change
pub fn application_changes(payload: &ApplicationPayload, now: DateTime<Utc>) -> ApplicationChanges {
    ApplicationChanges {
        description: payload.description.clone(),
        scopes: payload.scopes.clone(),
        updated_at: now,
    }
}

pub fn application_response(application: Application) -> ApplicationResponse {
    ApplicationResponse {
        id: application.id,
        owner_id: application.owner_id,
        owner_type: application.owner_type,
        description: application.description,
        scopes: application.scopes,
        client_uid: application.client_uid,
        client_secret: application.client_secret,
        created_at: application.created_at,
        updated_at: application.updated_at,
        revoked_at: application.revoked_at,
    }
}

pub fn grant_response(grant: AccessGrant, now: DateTime<Utc>) -> GrantResponse {
    GrantResponse {
        id: grant.id,
        application_id: grant.application_id,
        resource_owner_id: grant.resource_owner_id,
        scopes: grant.scopes,
        code: grant.code,
        redirect_uri: grant.redirect_uri,
        expires_in: seconds_until(grant.expires_in, now),
        expires_at: grant.expires_in,
        created_at: grant.created_at,
        revoked_at: grant.revoked_at,
    }
}

pub fn access_token_response(
    token: AccessToken,
    refresh_token: Option<RefreshToken>,
    now: DateTime<Utc>,
) -> AccessTokenResponse {
    AccessTokenResponse {
        id: token.id,
        application_id: token.application_id,
        resource_owner_id: token.resource_owner_id,
        token: token.token,
        token_type: TOKEN_TYPE.to_string(),
        scopes: token.scopes,
        expires_in: seconds_until(token.expires_in, now),
        expires_at: token.expires_in,
        created_at: token.created_at,
        refresh_token: refresh_token.map(|rt| rt.token),
        revoked_at: token.revoked_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 bytes → 43 base64url characters without padding
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc::now();
        assert_eq!(expiry(now, Duration::minutes(10)), now + Duration::minutes(10));
        assert_eq!(expiry(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(lifetime(std::time::Duration::from_secs(60)), Duration::seconds(60));
    }

    #[test]
    fn test_seconds_until_never_negative() {
        let now = Utc::now();
        assert_eq!(seconds_until(now + Duration::seconds(90), now), 90);
        assert_eq!(seconds_until(now - Duration::seconds(5), now), 0);
    }

    #[test]
    fn test_new_access_grant() {
        let now = Utc::now();
        let formatter = Formatter::default();
        let application = Application {
            id: 3,
            owner_id: None,
            owner_type: OwnerType::Public,
            description: None,
            scopes: "public".to_string(),
            client_uid: "uid".to_string(),
            client_secret: "secret".to_string(),
            created_at: now,
            updated_at: now,
            revoked_at: None,
        };
        let request = AuthorizationRequest {
            response_type: Some("code".to_string()),
            resource_owner_id: Some("user-1".to_string()),
            redirect_uri: Some("https://app.example/cb".to_string()),
            scopes: Some("public".to_string()),
            ..Default::default()
        };

        let grant = formatter.new_access_grant(&request, &application, now);
        assert_eq!(grant.application_id, 3);
        assert_eq!(grant.resource_owner_id, "user-1");
        assert_eq!(grant.expires_in, now + Duration::minutes(10));
        assert!(!grant.code.is_empty());
    }

    #[test]
    fn test_access_token_response_shape() {
        let now = Utc::now();
        let token = AccessToken {
            id: 1,
            application_id: 2,
            resource_owner_id: "user-1".to_string(),
            token: "abc".to_string(),
            scopes: "public".to_string(),
            expires_in: now + Duration::hours(1),
            created_at: now,
            revoked_at: None,
        };
        let refresh = RefreshToken {
            id: 1,
            access_token_id: 1,
            token: "def".to_string(),
            expires_in: now + Duration::hours(2),
            created_at: now,
            revoked_at: None,
        };

        let body = serde_json::to_value(access_token_response(token, Some(refresh), now)).unwrap();
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 3600);
        assert_eq!(body["refresh_token"], "def");
        assert!(body.get("revoked_at").is_none());
    }
}
