//! Administrative management of registered client applications

use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::error::OAuthError;
use crate::formatter;
use crate::store::{ApplicationStore, TxScope};
use crate::validator;
use crate::wire::{ApplicationList, ApplicationPayload, ApplicationResponse, Pagination, PaginationMeta};

#[derive(Clone)]
pub struct ApplicationManager {
    store: Arc<dyn ApplicationStore>,
}

impl ApplicationManager {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, page: Pagination) -> Result<ApplicationList, OAuthError> {
        const OP: &str = "list applications";
        let total = self
            .store
            .count(TxScope::Pool)
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;
        let items = self
            .store
            .list(page, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;

        Ok(ApplicationList {
            items: items.into_iter().map(formatter::application_response).collect(),
            meta: PaginationMeta {
                offset: page.offset,
                limit: page.limit,
                total,
            },
        })
    }

    pub async fn one(&self, id: i64) -> Result<ApplicationResponse, OAuthError> {
        self.store
            .one(id, TxScope::Pool)
            .await
            .map(formatter::application_response)
            .map_err(|e| OAuthError::from_store("get application", "application", e))
    }

    /// Registers an application with freshly generated client credentials
    pub async fn create(
        &self,
        payload: &ApplicationPayload,
    ) -> Result<ApplicationResponse, OAuthError> {
        const OP: &str = "create application";
        let owner_type = validator::validate_application_payload(payload)?;
        let new = formatter::new_application(payload, owner_type, Utc::now());

        let id = self
            .store
            .create(&new, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::internal(OP, e))?;
        info!("Registered {owner_type} application {id}");

        self.store
            .one(id, TxScope::Pool)
            .await
            .map(formatter::application_response)
            .map_err(|e| OAuthError::internal(OP, e))
    }

    /// Updates description and scopes. Other payload fields are ignored.
    pub async fn update(
        &self,
        id: i64,
        payload: &ApplicationPayload,
    ) -> Result<ApplicationResponse, OAuthError> {
        const OP: &str = "update application";
        let changes = formatter::application_changes(payload, Utc::now());
        self.store
            .update(id, &changes, TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store(OP, "application", e))?;
        info!("Updated application {id}");
        self.one(id).await
    }

    /// Soft-revokes an application; its credentials stop resolving immediately
    pub async fn revoke(&self, id: i64) -> Result<(), OAuthError> {
        self.store
            .revoke(id, Utc::now(), TxScope::Pool)
            .await
            .map_err(|e| OAuthError::from_store("revoke application", "application", e))?;
        info!("Revoked application {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::OwnerType;
    use crate::store::{test_support, SqliteApplications};

    async fn manager() -> ApplicationManager {
        let db = test_support::database().await;
        ApplicationManager::new(Arc::new(SqliteApplications::new(db)))
    }

    fn payload(owner_type: &str) -> ApplicationPayload {
        ApplicationPayload {
            owner_id: Some("owner-1".to_string()),
            owner_type: Some(owner_type.to_string()),
            description: Some("dashboard".to_string()),
            scopes: Some("public users".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_generates_credentials() {
        let manager = manager().await;
        let created = manager.create(&payload("confidential")).await.unwrap();

        assert_eq!(created.owner_type, OwnerType::Confidential);
        assert_eq!(created.scopes, "public users");
        assert!(!created.client_uid.is_empty());
        assert!(!created.client_secret.is_empty());
        assert_eq!(manager.one(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_owner_type() {
        let manager = manager().await;
        let err = manager.create(&payload("partner")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_only_touches_mutable_fields() {
        let manager = manager().await;
        let created = manager.create(&payload("public")).await.unwrap();

        let update = ApplicationPayload {
            owner_id: Some("someone-else".to_string()),
            owner_type: Some("confidential".to_string()),
            description: Some("renamed".to_string()),
            scopes: None,
        };
        let updated = manager.update(created.id, &update).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("renamed"));
        assert_eq!(updated.scopes, created.scopes);
        assert_eq!(updated.owner_id, created.owner_id);
        assert_eq!(updated.owner_type, OwnerType::Public);
        assert_eq!(updated.client_secret, created.client_secret);

        let missing = manager.update(4242, &update).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_pagination_meta() {
        let manager = manager().await;
        for _ in 0..3 {
            manager.create(&payload("public")).await.unwrap();
        }

        let page = manager.list(Pagination::new(Some(2), None)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(
            page.meta,
            PaginationMeta {
                offset: 2,
                limit: 20,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn test_revoke() {
        let manager = manager().await;
        let created = manager.create(&payload("public")).await.unwrap();
        manager.revoke(created.id).await.unwrap();
        assert!(manager.one(created.id).await.unwrap().revoked_at.is_some());
        assert_eq!(
            manager.revoke(created.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
