use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{expect_affected, Database, RefreshTokenStore, TxScope};
use crate::error::StoreError;
use crate::models::{NewRefreshToken, RefreshToken};

const COLUMNS: &str = "id, access_token_id, token, expires_in, created_at, revoked_at";

/// `oauth_refresh_tokens` table
#[derive(Debug, Clone)]
pub struct SqliteRefreshTokens {
    db: Database,
}

impl SqliteRefreshTokens {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenStore for SqliteRefreshTokens {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<RefreshToken, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_refresh_tokens WHERE id = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, RefreshToken>(&sql).bind(id).fetch_one(ex)
        })
    }

    async fn one_by_token(
        &self,
        token: &str,
        scope: TxScope<'_>,
    ) -> Result<RefreshToken, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_refresh_tokens WHERE token = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, RefreshToken>(&sql).bind(token).fetch_one(ex)
        })
    }

    async fn create(&self, new: &NewRefreshToken, scope: TxScope<'_>) -> Result<i64, StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                r#"
                INSERT INTO oauth_refresh_tokens (access_token_id, token, expires_in, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(new.access_token_id)
            .bind(&new.token)
            .bind(new.expires_in)
            .bind(new.created_at)
            .execute(ex)
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn revoke(
        &self,
        token: &str,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                "UPDATE oauth_refresh_tokens SET revoked_at = ? WHERE token = ? AND revoked_at IS NULL",
            )
            .bind(at)
            .bind(token)
            .execute(ex)
        })?;
        expect_affected(result.rows_affected())
    }
}
