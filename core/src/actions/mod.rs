//! Actions - the verbs statements dispatch to
//!
//! Every verb maps to one [`Action`] implementation through the
//! [`ActionRegistry`]. Actions declare a semantic role that decides whether
//! their result is bound in the feature set's scope.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::state_machine::TransitionError;
use crate::executor::context::ExecutionContext;
use crate::executor::expressions::EvalError;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, Value};

pub mod builtin;
pub mod registry;

pub use builtin::FnAction;
pub use registry::{ActionRegistry, DispatchError};

/// Semantic category of an action, governing data flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionRole {
    /// Pulls data in from outside the feature set
    Request,
    /// Computes a value inside the feature set
    Own,
    /// Ends the feature set or writes to an output channel
    Response,
    /// Hands data to the rest of the application
    Export,
}

impl ActionRole {
    /// Results of request and own actions are bound to the result name
    pub fn binds_result(self) -> bool {
        matches!(self, ActionRole::Request | ActionRole::Own)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionRole::Request => "request",
            ActionRole::Own => "own",
            ActionRole::Response => "response",
            ActionRole::Export => "export",
        }
    }
}

/// Static description of an action implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMetadata {
    pub name: String,
    pub role: ActionRole,
    /// Lowercase verbs that dispatch to this action
    pub verbs: Vec<String>,
    /// Prepositions accepted on the object
    pub prepositions: Vec<Preposition>,
}

impl ActionMetadata {
    pub fn new(name: &str, role: ActionRole, verbs: &[&str], prepositions: &[Preposition]) -> Self {
        Self {
            name: name.to_string(),
            role,
            verbs: verbs.iter().map(|v| v.to_ascii_lowercase()).collect(),
            prepositions: prepositions.to_vec(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Raised by `<Throw>`; ends the feature set with a categorized error
    #[error("{category}: {message}")]
    Thrown { category: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// An executable verb.
///
/// Implementations receive the statement's descriptors and the running
/// context; they resolve the object themselves, so an action can treat a
/// repository or service name differently from a variable.
#[async_trait]
pub trait Action: Send + Sync {
    fn metadata(&self) -> ActionMetadata;

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError>;
}

/* ===================== Role Catalog ===================== */

/// What the analyzer knows about a verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbInfo {
    pub action: String,
    pub role: ActionRole,
    /// Empty when prepositions are unknown
    pub prepositions: Vec<Preposition>,
}

/// Verb -> role lookup used during semantic analysis.
///
/// Built from a registry it is authoritative: verbs missing from it are
/// reported. The fallback table only supplies roles for common verbs.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    verbs: HashMap<String, VerbInfo>,
    authoritative: bool,
}

const FALLBACK_ROLES: &[(ActionRole, &[&str])] = &[
    (
        ActionRole::Request,
        &["extract", "retrieve", "fetch", "read", "receive", "request", "load", "parse"],
    ),
    (
        ActionRole::Own,
        &[
            "create", "set", "make", "build", "compute", "calculate", "derive", "filter",
            "select", "reduce", "aggregate", "sort", "order", "validate", "compare",
            "transform", "merge", "keepalive", "wait", "accept",
        ],
    ),
    (
        ActionRole::Response,
        &["return", "respond", "throw", "fail", "log", "print", "send", "write"],
    ),
    (
        ActionRole::Export,
        &["store", "save", "persist", "publish", "emit", "notify"],
    ),
];

impl RoleCatalog {
    /// Role table for analysis without a registry
    pub fn fallback() -> Self {
        let mut verbs = HashMap::new();
        for (role, names) in FALLBACK_ROLES {
            for name in names.iter() {
                verbs.insert(
                    name.to_string(),
                    VerbInfo {
                        action: name.to_string(),
                        role: *role,
                        prepositions: Vec::new(),
                    },
                );
            }
        }
        Self {
            verbs,
            authoritative: false,
        }
    }

    pub fn from_metadata<'a>(entries: impl IntoIterator<Item = &'a ActionMetadata>) -> Self {
        let mut verbs = HashMap::new();
        for meta in entries {
            for verb in &meta.verbs {
                verbs.insert(
                    verb.clone(),
                    VerbInfo {
                        action: meta.name.clone(),
                        role: meta.role,
                        prepositions: meta.prepositions.clone(),
                    },
                );
            }
        }
        Self {
            verbs,
            authoritative: true,
        }
    }

    pub fn info(&self, verb: &str) -> Option<&VerbInfo> {
        self.verbs.get(&verb.to_ascii_lowercase())
    }

    pub fn role_of(&self, verb: &str) -> Option<ActionRole> {
        self.info(verb).map(|info| info.role)
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }
}
