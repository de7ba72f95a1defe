//! # oauth-engine
//!
//! An embedded OAuth2 authorization server backed by SQLite.
//!
//! ## Components
//!
//! - **Store:** Persistence contracts for applications, grants, access and refresh tokens,
//!   each operating on the pool or inside a caller-supplied transaction.
//! - **Validator / Formatter:** Pure rule checks and record shaping.
//! - **Service:** The grant, token exchange, refresh rotation and revocation flows.
//! - **Applications:** Administrative management of registered clients.
//! - **Engine:** Assembles the above from a database handle and lifetimes.

pub mod applications;
pub mod builder;
pub mod error;
pub mod formatter;
pub mod models;
pub mod scope;
pub mod service;
pub mod store;
pub mod validator;
pub mod wire;

use std::sync::Arc;

pub use crate::applications::ApplicationManager;
pub use crate::builder::OAuthEngineBuilder;
pub use crate::error::{ErrorKind, OAuthError, StoreError};
pub use crate::service::{AuthorizationService, Stores};
pub use crate::store::Database;

/// A ready-to-use engine: the authorization service plus application management,
/// sharing one database.
#[derive(Clone)]
pub struct OAuthEngine {
    database: Database,
    service: Arc<AuthorizationService>,
    applications: ApplicationManager,
}

impl OAuthEngine {
    pub fn builder() -> OAuthEngineBuilder<builder::Missing> {
        OAuthEngineBuilder::new()
    }

    pub fn service(&self) -> &Arc<AuthorizationService> {
        &self.service
    }

    pub fn applications(&self) -> &ApplicationManager {
        &self.applications
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Whether the backing database answers
    pub async fn health(&self) -> bool {
        self.database.ping().await.is_ok()
    }
}
