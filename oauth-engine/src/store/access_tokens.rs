use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{expect_affected, AccessTokenStore, Database, TxScope};
use crate::error::StoreError;
use crate::models::{AccessToken, NewAccessToken};

const COLUMNS: &str =
    "id, application_id, resource_owner_id, token, scopes, expires_in, created_at, revoked_at";

/// `oauth_access_tokens` table
#[derive(Debug, Clone)]
pub struct SqliteAccessTokens {
    db: Database,
}

impl SqliteAccessTokens {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessTokenStore for SqliteAccessTokens {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<AccessToken, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_access_tokens WHERE id = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, AccessToken>(&sql).bind(id).fetch_one(ex)
        })
    }

    async fn one_by_token(
        &self,
        token: &str,
        scope: TxScope<'_>,
    ) -> Result<AccessToken, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_access_tokens WHERE token = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, AccessToken>(&sql).bind(token).fetch_one(ex)
        })
    }

    async fn create(&self, new: &NewAccessToken, scope: TxScope<'_>) -> Result<i64, StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                r#"
                INSERT INTO oauth_access_tokens
                    (application_id, resource_owner_id, token, scopes, expires_in, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(new.application_id)
            .bind(&new.resource_owner_id)
            .bind(&new.token)
            .bind(&new.scopes)
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
                "UPDATE oauth_access_tokens SET revoked_at = ? WHERE token = ? AND revoked_at IS NULL",
            )
            .bind(at)
            .bind(token)
            .execute(ex)
        })?;
        expect_affected(result.rows_affected())
    }
}
