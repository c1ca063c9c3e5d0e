//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::auth::{Actor, Authorizer};
use crate::config::Settings;
use crate::context::RequestContext;
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Database connection pool
    pub db_pool: Pool,

    pub settings: Settings,

    /// Permission gate consulted by the change-request engine
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(pool: Pool, settings: Settings, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            db_pool: pool,
            settings,
            authorizer,
        }
    }

    /// Context for one request made by `actor`
    pub fn context(&self, actor: Actor) -> RequestContext {
        RequestContext::new(
            actor,
            self.settings.changes.clone(),
            self.authorizer.clone(),
        )
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
