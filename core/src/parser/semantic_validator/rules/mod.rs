//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `undefined_variable.rs` - names read without any definition
//! - `unreachable_code.rs` - statements after `Return` / `Throw`
//! - `duplicate_lifecycle.rs` - more than one start or end handler
//! - `duplicate_publish.rs` - one alias published from several feature sets
//! - `questionable_flow.rs` - exports of undefined data, unused results
//! - `unknown_verb.rs` - verbs and prepositions the registry doesn't know

mod duplicate_lifecycle;
mod duplicate_publish;
mod questionable_flow;
mod undefined_variable;
mod unknown_verb;
mod unreachable_code;

pub use duplicate_lifecycle::DuplicateLifecycleRule;
pub use duplicate_publish::DuplicatePublishRule;
pub use questionable_flow::QuestionableFlowRule;
pub use undefined_variable::UndefinedVariableRule;
pub use unknown_verb::UnknownVerbRule;
pub use unreachable_code::UnreachableCodeRule;
