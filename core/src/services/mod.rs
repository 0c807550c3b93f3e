//! Runtime services shared by every feature-set invocation
//!
//! Built once before the first event is emitted and handed to each
//! [`ExecutionContext`](crate::executor::ExecutionContext) behind an `Arc`.
//! Nothing in here is mutated through a global; actions reach it only
//! through the context they are given.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::ActionRegistry;
use crate::config::RuntimeConfig;
use crate::events::StateTransitionEngine;
use crate::executor::GlobalSymbolRegistry;

pub mod repository;

pub use repository::RepositoryStore;

pub struct Services {
    pub registry: Arc<ActionRegistry>,
    pub globals: GlobalSymbolRegistry,
    pub transitions: StateTransitionEngine,
    pub repositories: RepositoryStore,
    /// Cooperative shutdown signal; releases `<Keepalive>` waits
    pub shutdown: CancellationToken,
    pub runtime: RuntimeConfig,
}

impl Services {
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            globals: GlobalSymbolRegistry::new(),
            transitions: StateTransitionEngine::new(),
            repositories: RepositoryStore::new(),
            shutdown: CancellationToken::new(),
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn with_transitions(mut self, transitions: StateTransitionEngine) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
