//! ARO runtime core
//!
//! Lexes, parses and checks ARO feature sets, then runs them as event
//! handlers on a tokio runtime.

pub mod actions;
pub mod application;
pub mod config;
pub mod events;
pub mod executor;
pub mod parser;
pub mod services;
pub mod sources;
pub mod telemetry;

// Re-export main types
pub use actions::{Action, ActionError, ActionMetadata, ActionRegistry, ActionRole, FnAction};
pub use application::{Application, ApplicationBuilder, RunSummary};
pub use config::{Config, ConfigError};
pub use events::{EventBus, EventKind, LifecyclePhase, RuntimeEvent, TransitionTable};
pub use executor::types::{Program, Value};
pub use executor::{ExecutionOutcome, FeatureSetExecutor};
pub use parser::{parse, parse_program};
pub use sources::{link, LinkError, SourceFile};
