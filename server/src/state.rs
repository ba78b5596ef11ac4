use std::sync::Arc;

use shared::config::LiveConfig;
use shared::types::{AppConfig, ConfigError};

use crate::tower_middle::EdgeGuard;

/// Shared server state, cloned into every connection.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Re-read per request; `[paths]` can change on SIGHUP.
    pub config: LiveConfig,
    /// Built once; route tables never reload.
    pub guard: Arc<EdgeGuard>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let guard = Arc::new(EdgeGuard::from_config(&config)?);
        Ok(Self {
            config: LiveConfig::new(config),
            guard,
        })
    }

    /// Swap in the page-serving settings from `fresh`, keeping everything
    /// else as loaded at startup.
    pub async fn reload_paths(&self, fresh: AppConfig) {
        let mut next = self.config.read().await.clone();
        next.paths = fresh.paths;
        self.config.reload(next).await;
    }
}
