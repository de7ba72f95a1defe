use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{expect_affected, ApplicationStore, Database, TxScope};
use crate::error::StoreError;
use crate::models::{Application, ApplicationChanges, NewApplication};
use crate::wire::Pagination;

const COLUMNS: &str = "id, owner_id, owner_type, description, scopes, client_uid, client_secret, \
                       created_at, updated_at, revoked_at";

/// `oauth_applications` table
#[derive(Debug, Clone)]
pub struct SqliteApplications {
    db: Database,
}

impl SqliteApplications {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ApplicationStore for SqliteApplications {
    async fn one(&self, id: i64, scope: TxScope<'_>) -> Result<Application, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_applications WHERE id = ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, Application>(&sql).bind(id).fetch_one(ex)
        })
    }

    async fn one_by_credentials(
        &self,
        client_uid: &str,
        client_secret: &str,
        scope: TxScope<'_>,
    ) -> Result<Application, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM oauth_applications \
             WHERE client_uid = ? AND client_secret = ? AND revoked_at IS NULL"
        );
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, Application>(&sql)
                .bind(client_uid)
                .bind(client_secret)
                .fetch_one(ex)
        })
    }

    async fn list(
        &self,
        page: Pagination,
        scope: TxScope<'_>,
    ) -> Result<Vec<Application>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM oauth_applications ORDER BY id LIMIT ? OFFSET ?");
        on_scope!(self.db, scope, |ex| {
            sqlx::query_as::<_, Application>(&sql)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(ex)
        })
    }

    async fn count(&self, scope: TxScope<'_>) -> Result<i64, StoreError> {
        on_scope!(self.db, scope, |ex| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM oauth_applications").fetch_one(ex)
        })
    }

    async fn create(&self, new: &NewApplication, scope: TxScope<'_>) -> Result<i64, StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                r#"
                INSERT INTO oauth_applications
                    (owner_id, owner_type, description, scopes, client_uid, client_secret, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&new.owner_id)
            .bind(new.owner_type.as_str())
            .bind(&new.description)
            .bind(&new.scopes)
            .bind(&new.client_uid)
            .bind(&new.client_secret)
            .bind(new.created_at)
            .bind(new.created_at)
            .execute(ex)
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn update(
        &self,
        id: i64,
        changes: &ApplicationChanges,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                r#"
                UPDATE oauth_applications
                SET description = COALESCE(?, description),
                    scopes = COALESCE(?, scopes),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&changes.description)
            .bind(&changes.scopes)
            .bind(changes.updated_at)
            .bind(id)
            .execute(ex)
        })?;
        expect_affected(result.rows_affected())
    }

    async fn revoke(
        &self,
        id: i64,
        at: DateTime<Utc>,
        scope: TxScope<'_>,
    ) -> Result<(), StoreError> {
        let result = on_scope!(self.db, scope, |ex| {
            sqlx::query(
                "UPDATE oauth_applications SET revoked_at = ?, updated_at = ? \
                 WHERE id = ? AND revoked_at IS NULL",
            )
            .bind(at)
            .bind(at)
            .bind(id)
            .execute(ex)
        })?;
        expect_affected(result.rows_affected())
    }
}
