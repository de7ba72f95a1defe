//! The authorization state machine: grant, token exchange, refresh rotation and revocation.
//!
//! Each operation that writes more than one row owns a transaction for its whole write path.
//! Single use of codes and refresh tokens is enforced by the compare-and-swap revokes of the
//! stores, so two concurrent redemptions of the same credential cannot both commit.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};

use crate::error::{OAuthError, StoreError};
use crate::formatter::{self, Formatter};
use crate::models::{AccessToken, Application, RefreshToken};
use crate::store::{
    AccessGrantStore, AccessTokenStore, ApplicationStore, Database, RefreshTokenStore, SqliteTx,
    TxScope,
};
use crate::validator::{self, GrantType, ResponseType};
use crate::wire::{
    AccessTokenRequest, AccessTokenResponse, Authorization, AuthorizationRequest, GrantResponse,
    RevokeRequest,
};

/// The four persistence contracts the service is composed of
#[derive(Clone)]
pub struct Stores {
    pub applications: Arc<dyn ApplicationStore>,
    pub grants: Arc<dyn AccessGrantStore>,
    pub access_tokens: Arc<dyn AccessTokenStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl Stores {
    /// SQLite-backed stores sharing one database
    pub fn sqlite(db: &Database) -> Self {
        use crate::store::{
            SqliteAccessGrants, SqliteAccessTokens, SqliteApplications, SqliteRefreshTokens,
        };
        Self {
            applications: Arc::new(SqliteApplications::new(db.clone())),
            grants: Arc::new(SqliteAccessGrants::new(db.clone())),
            access_tokens: Arc::new(SqliteAccessTokens::new(db.clone())),
            refresh_tokens: Arc::new(SqliteRefreshTokens::new(db.clone())),
        }
    }
}

pub struct AuthorizationService {
    db: Database,
    stores: Stores,
    formatter: Formatter,
    refresh_enabled: bool,
}

impl AuthorizationService {
    pub fn new(db: Database, stores: Stores, formatter: Formatter, refresh_enabled: bool) -> Self {
        Self {
            db,
            stores,
            formatter,
            refresh_enabled,
        }
    }

    pub fn refresh_enabled(&self) -> bool {
        self.refresh_enabled
    }

    pub fn applications(&self) -> &Arc<dyn ApplicationStore> {
        &self.stores.applications
    }

    pub fn access_tokens(&self) -> &Arc<dyn AccessTokenStore> {
        &self.stores.access_tokens
    }

    pub fn refresh_tokens(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.stores.refresh_tokens
    }

    /// Dispatches a grant request on its `response_type`
    pub async fn grantor(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<Authorization, OAuthError> {
        let response_type = match request.response_type.as_deref() {
            Some(value) if !value.is_empty() => ResponseType::parse(value)?,
            _ => return Err(OAuthError::validation("response_type is required")),
        };
        match response_type {
            ResponseType::Code => self.grant(request).await.map(Authorization::Grant),
            ResponseType::Token => self.grant_token(request).await.map(Authorization::Token),
        }
    }

    /// Authorization-code flow: issues a single-use code
    pub async fn grant(&self, request: &AuthorizationRequest) -> Result<GrantResponse, OAuthError> {
        const OP: &str = "grant";
        let application = self
            .resolve_application(OP, &request.client_uid, &request.client_secret)
            .await?;
        if validator::validate_authorization_grant(request, &application)? != ResponseType::Code {
            return Err(OAuthError::validation("response_type must be 'code'"));
        }

        let now = Utc::now();
        let new = self.formatter.new_access_grant(request, &application, now);

        let mut tx = self.begin(OP).await?;
        let id = self
            .stores
            .grants
            .create(&new, TxScope::Tx(&mut tx))
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;
        let grant = self
            .stores
            .grants
            .one(id, TxScope::Tx(&mut tx))
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;
        self.commit(OP, tx).await?;

        info!(
            "Issued authorization code {} to application {} for owner {}",
            grant.id, application.id, grant.resource_owner_id
        );
        Ok(formatter::grant_response(grant, now))
    }

    /// Implicit flow: issues an access token directly, plus a refresh token when enabled
    pub async fn grant_token(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AccessTokenResponse, OAuthError> {
        const OP: &str = "grant_token";
        let application = self
            .resolve_application(OP, &request.client_uid, &request.client_secret)
            .await?;
        if validator::validate_authorization_grant(request, &application)? != ResponseType::Token {
            return Err(OAuthError::validation("response_type must be 'token'"));
        }

        let now = Utc::now();
        let new = self
            .formatter
            .access_token_from_request(request, &application, now);

        let mut tx = self.begin(OP).await?;
        let (token, refresh_token) = self.issue(OP, &mut tx, new, now).await?;
        self.commit(OP, tx).await?;

        info!(
            "Issued access token {} to application {} through the implicit flow",
            token.id, application.id
        );
        Ok(formatter::access_token_response(token, refresh_token, now))
    }

    /// Token endpoint: redeems an authorization code or a refresh token
    pub async fn token(
        &self,
        request: &AccessTokenRequest,
    ) -> Result<AccessTokenResponse, OAuthError> {
        let application = self
            .resolve_application("token", &request.client_uid, &request.client_secret)
            .await?;
        match validator::validate_token_grant(request, self.refresh_enabled)? {
            GrantType::AuthorizationCode => self.exchange_code(request, &application).await,
            GrantType::RefreshToken => self.refresh(request, &application).await,
        }
    }

    async fn exchange_code(
        &self,
        request: &AccessTokenRequest,
        application: &Application,
    ) -> Result<AccessTokenResponse, OAuthError> {
        const OP: &str = "authorization_code exchange";
        let code = request.code.as_deref().unwrap_or_default();

        let grant = self
            .stores
            .grants
            .one_by_code(code, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store(OP, "authorization code", e))?;

        let now = Utc::now();
        validator::validate_authorization_code_redemption(request, &grant, application, now)?;

        let mut tx = self.begin(OP).await?;
        // Losing the compare-and-swap means a concurrent exchange already consumed the code
        match self
            .stores
            .grants
            .revoke(&grant.code, now, TxScope::Tx(&mut tx))
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                debug!("Authorization code {} redeemed concurrently", grant.id);
                return Err(OAuthError::forbidden("authorization code already used"));
            }
            Err(e) => return Err(OAuthError::internal(OP, e)),
        }

        let new = self.formatter.access_token_from_grant(&grant, now);
        let (token, refresh_token) = self.issue(OP, &mut tx, new, now).await?;
        self.commit(OP, tx).await?;

        info!(
            "Exchanged authorization code {} for access token {}",
            grant.id, token.id
        );
        Ok(formatter::access_token_response(token, refresh_token, now))
    }

    async fn refresh(
        &self,
        request: &AccessTokenRequest,
        application: &Application,
    ) -> Result<AccessTokenResponse, OAuthError> {
        const OP: &str = "refresh_token rotation";
        let presented = request.refresh_token.as_deref().unwrap_or_default();

        let old_refresh = self
            .stores
            .refresh_tokens
            .one_by_token(presented, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store(OP, "refresh token", e))?;

        let now = Utc::now();
        validator::validate_refresh_token_redemption(&old_refresh, now)?;

        let old_token = self
            .stores
            .access_tokens
            .one(old_refresh.access_token_id, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store(OP, "access token", e))?;
        validator::validate_token_ownership(&old_token, application)?;

        // The revoke is the first write so the transaction takes the write lock before anything
        // else. Any early return drops the transaction, which rolls it back and leaves the
        // presented refresh token usable.
        let mut tx = self.begin(OP).await?;
        match self
            .stores
            .refresh_tokens
            .revoke(&old_refresh.token, now, TxScope::Tx(&mut tx))
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                debug!("Refresh token {} redeemed concurrently", old_refresh.id);
                return Err(OAuthError::forbidden("refresh token already used"));
            }
            Err(e) => return Err(OAuthError::internal(OP, e)),
        }

        let new = self.formatter.access_token_from_token(&old_token, now);
        let token_id = self
            .stores
            .access_tokens
            .create(&new, TxScope::Tx(&mut tx))
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;

        let new_refresh = self.formatter.new_refresh_token(token_id, now);
        let refresh_id = self
            .stores
            .refresh_tokens
            .create(&new_refresh, TxScope::Tx(&mut tx))
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;

        let token = self
            .stores
            .access_tokens
            .one(token_id, TxScope::Tx(&mut tx))
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;
        let refresh_token = self
            .stores
            .refresh_tokens
            .one(refresh_id, TxScope::Tx(&mut tx))
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;
        self.commit(OP, tx).await?;

        info!(
            "Rotated refresh token {} into access token {}",
            old_refresh.id, token.id
        );
        Ok(formatter::access_token_response(
            token,
            Some(refresh_token),
            now,
        ))
    }

    /// Revokes a live access token by its value
    pub async fn revoke_token(&self, request: &RevokeRequest) -> Result<(), OAuthError> {
        const OP: &str = "revoke";
        let token = match request.token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => return Err(OAuthError::validation("token is required")),
        };

        self.stores
            .access_tokens
            .revoke(token, Utc::now(), TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store(OP, "token", e))?;
        info!("Revoked an access token");
        Ok(())
    }

    async fn resolve_application(
        &self,
        operation: &str,
        client_uid: &Option<String>,
        client_secret: &Option<String>,
    ) -> Result<Application, OAuthError> {
        let (Some(uid), Some(secret)) = (client_uid.as_deref(), client_secret.as_deref()) else {
            return Err(OAuthError::validation(
                "client_uid and client_secret are required",
            ));
        };
        let application = self
            .stores
            .applications
            .one_by_credentials(uid, secret, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store(operation, "application", e))?;
        debug!("{operation}: authenticated application {}", application.id);
        Ok(application)
    }

    /// Inserts an access token, and its refresh token when the feature is on, then reads both
    /// back inside `tx`
    async fn issue(
        &self,
        operation: &str,
        tx: &mut SqliteTx,
        new: crate::models::NewAccessToken,
        now: chrono::DateTime<Utc>,
    ) -> Result<(AccessToken, Option<RefreshToken>), OAuthError> {
        let token_id = self
            .stores
            .access_tokens
            .create(&new, TxScope::Tx(&mut *tx))
            .await
            .map_err(|e| OAuthError::internal(operation, e))?;

        let refresh_token = if self.refresh_enabled {
            let new_refresh = self.formatter.new_refresh_token(token_id, now);
            let refresh_id = self
                .stores
                .refresh_tokens
                .create(&new_refresh, TxScope::Tx(&mut *tx))
                .await
                .map_err(|e| OAuthError::internal(operation, e))?;
            Some(
                self.stores
                    .refresh_tokens
                    .one(refresh_id, TxScope::Tx(&mut *tx))
                    .await
                    .map_err(|e| OAuthError::internal(operation, e))?,
            )
        } else {
            None
        };

        let token = self
            .stores
            .access_tokens
            .one(token_id, TxScope::Tx(&mut *tx))
            .await
            .map_err(|e| OAuthError::internal(operation, e))?;
        Ok((token, refresh_token))
    }

    async fn begin(&self, operation: &str) -> Result<SqliteTx, OAuthError> {
        self.db
            .begin()
            .await
            .map_err(|e| OAuthError::internal(operation, e))
    }

    async fn commit(&self, operation: &str, tx: SqliteTx) -> Result<(), OAuthError> {
        self.db
            .commit(tx)
            .await
            .map_err(|e| OAuthError::internal(operation, e))
    }
}
