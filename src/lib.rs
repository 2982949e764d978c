pub mod access;
pub mod agent;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod format;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod session;
pub mod viz;

use std::sync::Arc;

use access::AccessGate;
use agent::QueryAgent;
use prompt::PromptTemplate;
use session::SessionStore;
use viz::GeometryCache;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<dyn QueryAgent>,
    pub sessions: Arc<SessionStore>,
    pub prompt: Arc<PromptTemplate>,
    pub geometry: Arc<GeometryCache>,
    pub gate: Arc<AccessGate>,
}

impl AppState {
    pub fn new(
        agent: Arc<dyn QueryAgent>,
        prompt: PromptTemplate,
        geometry: GeometryCache,
    ) -> Self {
        Self {
            agent,
            sessions: Arc::new(SessionStore::new()),
            prompt: Arc::new(prompt),
            geometry: Arc::new(geometry),
            gate: Arc::new(AccessGate::default()),
        }
    }
}
