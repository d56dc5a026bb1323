//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::relay::RelayHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: RelayHandle,
}

impl AppState {
    pub fn new(config: Config, relay: RelayHandle) -> Self {
        Self {
            config: Arc::new(config),
            relay,
        }
    }
}
