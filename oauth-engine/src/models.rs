//! Persisted entities and their insertable counterparts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Whether an application can be trusted to hold a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Confidential,
    Public,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Confidential => "confidential",
            OwnerType::Public => "public",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confidential" => Ok(OwnerType::Confidential),
            "public" => Ok(OwnerType::Public),
            other => Err(format!("unknown owner type '{other}'")),
        }
    }
}

impl TryFrom<String> for OwnerType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Credentials that expire and can be revoked.
///
/// A credential is live iff it has not been revoked and `now` is strictly before its expiry,
/// so a credential whose expiry equals `now` is already dead.
pub trait Expiring {
    fn expires_in(&self) -> DateTime<Utc>;
    fn revoked_at(&self) -> Option<DateTime<Utc>>;

    fn is_revoked(&self) -> bool {
        self.revoked_at().is_some()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_in()
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// A registered OAuth client
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Application {
    pub id: i64,
    pub owner_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub owner_type: OwnerType,
    pub description: Option<String>,
    pub scopes: String,
    pub client_uid: String,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub owner_id: Option<String>,
    pub owner_type: OwnerType,
    pub description: Option<String>,
    pub scopes: String,
    pub client_uid: String,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Mutable subset of an application. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationChanges {
    pub description: Option<String>,
    pub scopes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// An issued authorization code
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AccessGrant {
    pub id: i64,
    pub application_id: i64,
    pub resource_owner_id: String,
    pub scopes: String,
    pub code: String,
    pub redirect_uri: String,
    pub expires_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessGrant {
    pub application_id: i64,
    pub resource_owner_id: String,
    pub scopes: String,
    pub code: String,
    pub redirect_uri: String,
    pub expires_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expiring for AccessGrant {
    fn expires_in(&self) -> DateTime<Utc> {
        self.expires_in
    }

    fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }
}

/// A bearer credential
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AccessToken {
    pub id: i64,
    pub application_id: i64,
    pub resource_owner_id: String,
    pub token: String,
    pub scopes: String,
    pub expires_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessToken {
    pub application_id: i64,
    pub resource_owner_id: String,
    pub token: String,
    pub scopes: String,
    pub expires_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expiring for AccessToken {
    fn expires_in(&self) -> DateTime<Utc> {
        self.expires_in
    }

    fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }
}

/// A single-use credential that mints a new access token
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub access_token_id: i64,
    pub token: String,
    pub expires_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRefreshToken {
    pub access_token_id: i64,
    pub token: String,
    pub expires_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expiring for RefreshToken {
    fn expires_in(&self) -> DateTime<Utc> {
        self.expires_in
    }

    fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }
}
