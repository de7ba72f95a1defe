use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{expect_affected, AccessGrantStore, Database, TxScope};
use crate::error::StoreError;
use crate::models::{AccessGrant, NewAccessGrant};

const COLUMNS: &str =
    "id, application_id, resource_owner_id, scopes, code, redirect_uri, expires_in, created_at, revoked_at";

/// `oauth_access_grants` table
#[derive(Debug, Clone)]
pub struct SqliteAccessGrants {
    db: Database,
}

impl SqliteAccessGrants {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessGrantStore for SqliteAccessGrants {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<AccessGrant, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_access_grants WHERE id = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, AccessGrant>(&sql).bind(id).fetch_one(ex)
        })
    }

    async fn one_by_code(&self, code: &str, scope: TxScope<'_>) -> Result<AccessGrant, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_access_grants WHERE code = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, AccessGrant>(&sql).bind(code).fetch_one(ex)
        })
    }

    async fn create(&self, new: &NewAccessGrant, scope: TxScope<'_>) -> Result<i64, StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                r#"
                INSERT INTO oauth_access_grants
                    (application_id, resource_owner_id, scopes, code, redirect_uri, expires_in, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(new.application_id)
            .bind(&new.resource_owner_id)
            .bind(&new.scopes)
            .bind(&new.code)
            .bind(&new.redirect_uri)
            .bind(new.expires_in)
            .bind(new.created_at)
            .execute(ex)
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn revoke(
        &self,
        code: &str,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                "UPDATE oauth_access_grants SET revoked_at = ? WHERE code = ? AND revoked_at IS NULL",
            )
            .bind(at)
            .bind(code)
            .execute(ex)
        })?;
        expect_affected(result.rows_affected())
    }
}
