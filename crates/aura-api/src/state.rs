//! Application state.

use std::sync::Arc;

use aura_worker::{JobExecutor, WorkerConfig};

use crate::auth::TokenVerifier;
use crate::config::ApiConfig;
use crate::ws::LiveConnections;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker: Arc<WorkerConfig>,
    pub executor: Arc<JobExecutor>,
    pub connections: Arc<LiveConnections>,
    pub verifier: Option<Arc<TokenVerifier>>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        worker: WorkerConfig,
        executor: JobExecutor,
        connections: Arc<LiveConnections>,
    ) -> Self {
        let verifier = config
            .jwt_secret
            .as_deref()
            .map(|secret| Arc::new(TokenVerifier::new(secret)));

        Self {
            config,
            worker: Arc::new(worker),
            executor: Arc::new(executor),
            connections,
            verifier,
        }
    }
}
