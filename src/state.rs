//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::github::GitDataApi;
use crate::publish::Publisher;
use crate::upload::SessionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    sessions: SessionStore,
    publisher: Publisher,
}

impl AppState {
    pub fn new(config: Config, api: Arc<dyn GitDataApi>) -> Self {
        let publisher = Publisher::new(api, config.upload.asset_root.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions: SessionStore::new(),
                publisher,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Branch that uploads are published to
    pub fn branch(&self) -> &str {
        &self.inner.config.github.branch
    }

    /// Get the upload session store
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Get the publisher
    pub fn publisher(&self) -> &Publisher {
        &self.inner.publisher
    }

    /// Start the idle-session sweep
    pub fn start_session_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let upload = &self.inner.config.upload;
        self.inner
            .sessions
            .clone()
            .start_cleanup_task(upload.session_ttl, upload.sweep_interval)
    }
}
