use std::sync::Arc;

use crate::config::Config;
use crate::services::attempt_api::HttpAttemptApi;
use crate::services::attempt_cache::AttemptCache;
use crate::services::attempt_controller::AttemptController;
use crate::services::attempt_session::AttemptSnapshot;

pub mod answer_store;
pub mod attempt_api;
pub mod attempt_cache;
pub mod attempt_controller;
pub mod attempt_session;
pub mod autosave;
pub mod countdown;
pub mod violation_monitor;

/// Process-wide client state: configuration, backend client and the shared attempt cache.
pub struct AppState {
    pub config: Config,
    pub api: Arc<HttpAttemptApi>,
    pub cache: AttemptCache,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let api = Arc::new(HttpAttemptApi::from_config(&config));

        tracing::info!(
            "Test backend client ready: base_url={}, timeout={}s",
            api.base_url(),
            config.request_timeout_seconds
        );

        Self {
            config,
            api,
            cache: AttemptCache::new(),
        }
    }

    /// Controller for a new attempt screen, plus the receiver its snapshots go to.
    pub fn attempt_controller(
        &self,
    ) -> (
        AttemptController<HttpAttemptApi>,
        tokio::sync::watch::Receiver<AttemptSnapshot>,
    ) {
        AttemptController::new(
            Arc::clone(&self.api),
            self.config.controller_settings(),
            self.cache.clone(),
        )
    }
}
