use super::{InterceptError, Interceptor, ProxiedRequest, APPLICATION_ID_HEADER};
use crate::routes::AuthMode;
use async_trait::async_trait;
use log::{debug, error};
use oauth_engine::store::{ApplicationStore, TxScope};
use oauth_engine::StoreError;
use serde::Deserialize;
use std::sync::Arc;

/// Guards `auth: oauth_application` routes with client credentials carried in the JSON body
pub struct ApplicationCredentialInterceptor {
    applications: Arc<dyn ApplicationStore>,
}

impl ApplicationCredentialInterceptor {
    pub fn new(applications: Arc<dyn ApplicationStore>) -> Self {
        Self { applications }
    }
}

#[derive(Debug, Deserialize)]
struct ClientCredentials {
    #[serde(default)]
    client_uid: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[async_trait]
impl Interceptor for ApplicationCredentialInterceptor {
    fn name(&self) -> &'static str {
        "application-credential"
    }

    async fn intercept(&self, request: &mut ProxiedRequest) -> Result<(), InterceptError> {
        if request.route.auth != AuthMode::OAuthApplication {
            return Ok(());
        }
        if request.body.is_empty() {
            return Err(InterceptError::MissingBody);
        }

        let credentials: ClientCredentials = serde_json::from_slice(&request.body)
            .map_err(|e| InterceptError::MalformedBody(e.to_string()))?;
        let (Some(client_uid), Some(client_secret)) = (
            non_empty(credentials.client_uid),
            non_empty(credentials.client_secret),
        ) else {
            return Err(InterceptError::MissingCredentials);
        };

        let application = match self
            .applications
            .one_by_credentials(&client_uid, &client_secret, TxScope::Pool)
            .await
        {
            Ok(application) => application,
            Err(StoreError::NotFound) => return Err(InterceptError::ApplicationNotFound),
            Err(err) => {
                error!("Application lookup failed: {err}");
                return Err(InterceptError::Unavailable);
            }
        };

        debug!(
            "Application {} accepted for route '{}'",
            application.id, request.route.name
        );
        request.set_identity(APPLICATION_ID_HEADER, &application.id.to_string());
        Ok(())
    }
}
