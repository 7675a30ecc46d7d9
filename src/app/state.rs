//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::game::session::SessionStores;
use crate::game::{SessionRegistry, TickTiming};
use crate::store::{
    MemoryResultStore, MemorySessionStore, ResultStore, SessionStore, SupabaseClient,
    SupabaseResultStore,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionStore>,
    pub results: Arc<dyn ResultStore>,
    pub registry: Arc<SessionRegistry>,
    pub timing: TickTiming,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let results: Arc<dyn ResultStore> = match &config.results_api {
            Some(api) => {
                info!(url = %api.url, "Persisting results through PostgREST");
                Arc::new(SupabaseResultStore::new(SupabaseClient::new(api)))
            }
            None => {
                info!("RESULTS_API_URL not set, keeping results in memory");
                Arc::new(MemoryResultStore::new())
            }
        };

        Self::with_stores(config, Arc::new(MemorySessionStore::new()), results)
    }

    pub fn with_stores(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        let timing = TickTiming::from_config(&config);
        Self {
            config: Arc::new(config),
            sessions,
            results,
            registry: Arc::new(SessionRegistry::new()),
            timing,
        }
    }

    /// Store handles for one game session
    pub fn session_stores(&self) -> SessionStores {
        SessionStores {
            sessions: self.sessions.clone(),
            results: self.results.clone(),
            ttl: self.config.session_ttl,
        }
    }
}
