use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::applications::ApplicationManager;
use crate::error::StoreError;
use crate::formatter::{self, Formatter, Lifetimes};
use crate::service::{AuthorizationService, Stores};
use crate::store::Database;
use crate::OAuthEngine;

/// Marker types to track whether a database has been provided.
pub struct Missing;
pub struct Present(Database);

/// A builder for assembling an [`OAuthEngine`].
/// The builder is generic over one type parameter:
/// - DatabaseSet: whether the database handle has been supplied.
pub struct OAuthEngineBuilder<DatabaseSet> {
    pub(crate) database: DatabaseSet,
    pub(crate) stores: Option<Stores>,
    pub(crate) lifetimes: Lifetimes,
    pub(crate) refresh_enabled: bool,
}

impl OAuthEngineBuilder<Missing> {
    /// Creates a new builder with default lifetimes and refresh tokens disabled.
    pub fn new() -> Self {
        Self {
            database: Missing,
            stores: None,
            lifetimes: Lifetimes::default(),
            refresh_enabled: false,
        }
    }

    /// Sets the database every store and transaction runs against.
    pub fn with_database(self, database: Database) -> OAuthEngineBuilder<Present> {
        OAuthEngineBuilder {
            database: Present(database),
            stores: self.stores,
            lifetimes: self.lifetimes,
            refresh_enabled: self.refresh_enabled,
        }
    }
}

impl Default for OAuthEngineBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<DatabaseSet> OAuthEngineBuilder<DatabaseSet> {
    /// Sets the lifetime of issued access tokens.
    pub fn with_access_token_timeout(mut self, timeout: Duration) -> Self {
        self.lifetimes.access_token = formatter::lifetime(timeout);
        self
    }

    /// Sets the lifetime of authorization codes.
    pub fn with_authorization_code_timeout(mut self, timeout: Duration) -> Self {
        self.lifetimes.authorization_code = formatter::lifetime(timeout);
        self
    }

    /// Enables or disables refresh tokens and sets their lifetime.
    /// When disabled, the `refresh_token` grant type is rejected and no refresh tokens are issued.
    pub fn with_refresh_tokens(mut self, active: bool, timeout: Duration) -> Self {
        self.refresh_enabled = active;
        self.lifetimes.refresh_token = formatter::lifetime(timeout);
        self
    }

    /// Replaces the SQLite stores, e.g. with fakes.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }
}

impl OAuthEngineBuilder<Present> {
    pub async fn build(self) -> Result<OAuthEngine, StoreError> {
        let Present(database) = self.database;
        database.migrate().await?;

        let stores = self.stores.unwrap_or_else(|| Stores::sqlite(&database));
        let applications = ApplicationManager::new(stores.applications.clone());
        let service = AuthorizationService::new(
            database.clone(),
            stores,
            Formatter::new(self.lifetimes),
            self.refresh_enabled,
        );
        info!(
            "OAuth engine ready (refresh tokens {})",
            if self.refresh_enabled { "enabled" } else { "disabled" }
        );

        Ok(OAuthEngine {
            database,
            service: Arc::new(service),
            applications,
        })
    }
}
