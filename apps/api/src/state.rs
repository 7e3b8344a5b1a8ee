use std::sync::Arc;

use crate::builder::manager::SessionManager;
use crate::config::Config;
use crate::llm_client::GenerationCapability;
use crate::rewrite::tracker::ValidationTracker;
use crate::store::RecordStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    /// Generation capability. Default: the Anthropic-backed `LlmClient`.
    pub generator: Arc<dyn GenerationCapability>,
    /// Live builder sessions with periodic auto-save.
    pub sessions: Arc<SessionManager>,
    /// Latest-request guard for fire-and-forget rewrite validations.
    pub validations: Arc<ValidationTracker>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn GenerationCapability>,
        config: Config,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            config.pipeline.session_ttl,
        ));
        Self {
            store,
            generator,
            sessions,
            validations: Arc::new(ValidationTracker::new()),
            config,
        }
    }
}
