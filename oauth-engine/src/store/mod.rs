//! Persistence contracts and their SQLite implementation.
//!
//! Every store call takes a [`TxScope`]: either run directly on the pool, or inside a
//! transaction owned by the caller so that several writes commit or roll back together.
//! Every round trip is bounded by the database's query timeout.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;

use crate::error::StoreError;
use crate::models::{
    AccessGrant, AccessToken, Application, ApplicationChanges, NewAccessGrant, NewAccessToken,
    NewApplication, NewRefreshToken, RefreshToken,
};
use crate::wire::Pagination;

pub type SqliteTx = sqlx::Transaction<'static, Sqlite>;

/// Where a store call runs
pub enum TxScope<'a> {
    Pool,
    Tx(&'a mut SqliteTx),
}

impl<'a> From<&'a mut SqliteTx> for TxScope<'a> {
    fn from(tx: &'a mut SqliteTx) -> Self {
        TxScope::Tx(tx)
    }
}

/// Runs a query against whichever executor the scope designates, under the query timeout.
/// `$ex` is bound to the executor inside `$body`.
macro_rules! on_scope {
    ($db:expr, $scope:expr, |$ex:ident| $body:expr) => {
        match $scope {
            $crate::store::TxScope::Pool => {
                let $ex = $db.pool();
                $db.timed($body).await
            }
            $crate::store::TxScope::Tx(tx) => {
                let $ex = &mut **tx;
                $db.timed($body).await
            }
        }
    };
}

mod access_tokens;
mod applications;
mod grants;
mod refresh_tokens;

pub use access_tokens::SqliteAccessTokens;
pub use applications::SqliteApplications;
pub use grants::SqliteAccessGrants;
pub use refresh_tokens::SqliteRefreshTokens;

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<Application, StoreError>;

    /// Resolves a client by its credentials; soft-revoked applications are never returned
    async fn one_by_credentials(
        &self,
        client_uid: &str,
        client_secret: &str,
        scope: TxScope<'_>,
    ) -> Result<Application, StoreError>;

    async fn list(
        &self,
        page: Pagination,
        scope: TxScope<'_>,
    ) -> Result<Vec<Application>, StoreError>;

    async fn count(&self, scope: TxScope<'_>) -> Result<i64, StoreError>;

    async fn create(&self, new: &NewApplication, scope: TxScope<'_>) -> Result<i64, StoreError>;

    async fn update(
        &self,
        id: i64,
        changes: &ApplicationChanges,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError>;

    async fn revoke(
        &self,
        id: i64,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AccessGrantStore: Send + Sync {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<AccessGrant, StoreError>;

    async fn one_by_code(&self, code: &str, scope: TxScope<'_>) -> Result<AccessGrant, StoreError>;

    async fn create(&self, new: &NewAccessGrant, scope: TxScope<'_>) -> Result<i64, StoreError>;

    /// Marks a live grant as used. Fails `NotFound` if the code is unknown or already revoked.
    async fn revoke(
        &self,
        code: &str,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<AccessToken, StoreError>;

    async fn one_by_token(&self, token: &str, scope: TxScope<'_>)
        -> Result<AccessToken, StoreError>;

    async fn create(&self, new: &NewAccessToken, scope: TxScope<'_>) -> Result<i64, StoreError>;

    async fn revoke(
        &self,
        token: &str,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<RefreshToken, StoreError>;

    async fn one_by_token(
        &self,
        token: &str,
        scope: TxScope<'_>,
    ) -> Result<RefreshToken, StoreError>;

    async fn create(&self, new: &NewRefreshToken, scope: TxScope<'_>) -> Result<i64, StoreError>;

    /// Compare-and-swap on `revoked_at`: of two concurrent redemptions only one succeeds
    async fn revoke(
        &self,
        token: &str,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError>;
}

/// Rows touched by a revoke or update; zero means the key was unknown or already revoked
pub(crate) fn expect_affected(rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

/// Connection pool plus the per-call timeout applied to every round trip
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl Database {
    pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

    /// Opens (and creates if needed) the database at `url`
    pub async fn connect(
        url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(query_timeout)
            .connect_with(options)
            .await?;
        info!("Connected to database {url}");
        Ok(Self::from_pool(pool, query_timeout))
    }

    pub fn from_pool(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// A private in-memory database with migrations applied.
    ///
    /// Every connection to `sqlite::memory:` sees its own database, so the pool is pinned to
    /// one connection that is never recycled.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self::from_pool(pool, Self::DEFAULT_QUERY_TIMEOUT);
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<SqliteTx, StoreError> {
        self.timed(self.pool.begin()).await
    }

    pub async fn commit(&self, tx: SqliteTx) -> Result<(), StoreError> {
        self.timed(tx.commit()).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.timed(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Awaits `fut` for at most the query timeout
    pub(crate) async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from_sqlx),
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        }
    }
}
