//! Executor - runs feature sets against a per-invocation context
//!
//! The parser produces the AST in [`types`]; [`FeatureSetExecutor`] walks it
//! statement by statement, dispatching actions through the registry held by
//! the shared [`Services`](crate::services::Services).

pub mod context;
pub mod errors;
pub mod expressions;
pub mod globals;
pub mod statements;
pub mod types;

#[cfg(test)]
mod tests;

pub use context::{ExecutionContext, Response};
pub use errors::{ExecutionError, FailureKind};
pub use globals::GlobalSymbolRegistry;
pub use statements::{ExecState, ExecutionOutcome, FeatureSetExecutor};
