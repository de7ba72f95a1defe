//! HTTP controllers over the OAuth engine.
//!
//! - `/oauth/authorizations*`: grant, token exchange and revocation, authenticated by the
//!   client credentials or tokens in the request body.
//! - `/oauth/applications*`: application management, guarded by the admin API key.

mod applications;
mod authorizations;

use crate::api::authn_middleware::admin_authentication;
use crate::state::AppState;
// `routes!` needs the generated `__path_*` items next to each handler
use applications::*;
use authorizations::*;
use axum::middleware;
use utoipa_axum::{router::OpenApiRouter, routes};

pub(super) fn router(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .merge(admin_routes(state))
}

fn admin_routes(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_applications, create_application))
        .routes(routes!(
            get_application,
            update_application,
            revoke_application
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_authentication,
        ))
}
