//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every connection.

use crate::config::Config;
use eduquest_core::coordinator::Services;
use eduquest_core::ports::{AuthService, ProfileStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct ServiceState {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn ProfileStore>,
    pub config: Arc<Config>,
}

impl ServiceState {
    /// The ports handed to each connection's coordinator.
    pub fn services(&self) -> Services {
        Services {
            auth: self.auth.clone(),
            store: self.store.clone(),
        }
    }
}
