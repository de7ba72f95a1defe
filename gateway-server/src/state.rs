use crate::config::{GatewayConfig, SettingsError};
use crate::interceptors::Interceptors;
use crate::routes::{RouteError, RouteTable};
use log::info;
use oauth_engine::{Database, OAuthEngine, StoreError};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Reasons the gateway cannot start
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("database: {0}")]
    Database(#[from] StoreError),

    #[error(transparent)]
    Routes(#[from] RouteError),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything the handlers share, composed once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub engine: OAuthEngine,
    pub routes: Arc<RouteTable>,
    pub interceptors: Interceptors,
    pub upstream_client: Client,
}

impl AppState {
    fn create_upstream_client(timeout: u64) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            // Redirects are the client's business
            .redirect(reqwest::redirect::Policy::none())
            .build()
    }

    async fn build_engine(
        config: &GatewayConfig,
        database: Database,
    ) -> Result<OAuthEngine, StartupError> {
        let settings = config.oauth.settings()?;
        let engine = OAuthEngine::builder()
            .with_database(database)
            .with_access_token_timeout(settings.access_token_timeout)
            .with_authorization_code_timeout(settings.authorization_code_timeout)
            .with_refresh_tokens(
                settings.refresh_token_active,
                settings.refresh_token_timeout,
            )
            .build()
            .await?;
        Ok(engine)
    }

    fn assemble(
        config: GatewayConfig,
        engine: OAuthEngine,
        routes: RouteTable,
    ) -> Result<Self, StartupError> {
        let upstream_client = Self::create_upstream_client(config.upstream_timeout)?;
        Ok(Self {
            interceptors: Interceptors::oauth(&engine),
            config: Arc::new(config),
            engine,
            routes: Arc::new(routes),
            upstream_client,
        })
    }

    pub async fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let db_config = config.oauth_database()?;
        // Fail on bad durations before touching the database
        config.oauth.settings()?;
        let database = Database::connect(
            &db_config.url,
            db_config.max_connections,
            db_config.query_timeout()?,
        )
        .await?;
        let engine = Self::build_engine(&config, database).await?;

        let routes = RouteTable::load(&config.routes_file)?;
        info!(
            "Gateway state ready: {} route(s), oauth database '{}'",
            routes.len(),
            config.oauth.database
        );
        Self::assemble(config, engine, routes)
    }

    /// State over a private in-memory database
    #[cfg(test)]
    pub async fn for_testing(config: GatewayConfig, routes: RouteTable) -> Self {
        let database = Database::in_memory()
            .await
            .expect("Failed to open in-memory database");
        let engine = Self::build_engine(&config, database)
            .await
            .expect("Failed to build OAuth engine");
        Self::assemble(config, engine, routes).expect("Failed to assemble state")
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        self.engine.health().await
    }
}
