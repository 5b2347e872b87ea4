pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod grants;
pub mod roster;
pub mod routes;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use gateway::hub::HubHandle;
use grants::GrantIssuer;
use roster::RosterProvider;

/// Shared application state available to all route handlers and connection
/// tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: HubHandle,
    pub authenticator: Arc<dyn Authenticator>,
    pub roster: Arc<dyn RosterProvider>,
    pub grants: Arc<dyn GrantIssuer>,
}
