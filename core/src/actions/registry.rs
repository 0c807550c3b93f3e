//! Verb -> action lookup

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::{builtin, Action, ActionError, ActionMetadata, ActionRole, RoleCatalog};
use crate::executor::context::ExecutionContext;
use crate::executor::types::{ActionStmt, Preposition, Value};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown action verb <{verb}>")]
    UnknownVerb { verb: String },

    #[error("<{verb}> does not accept '{}' (expected one of: {})", .preposition.as_str(), join(.expected))]
    InvalidPreposition {
        verb: String,
        preposition: Preposition,
        expected: Vec<Preposition>,
    },

    #[error("verb '{verb}' is already registered by action '{existing}'")]
    DuplicateVerb { verb: String, existing: String },

    #[error(transparent)]
    Action(#[from] ActionError),
}

fn join(prepositions: &[Preposition]) -> String {
    prepositions
        .iter()
        .map(Preposition::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

struct Registered {
    action: Arc<dyn Action>,
    metadata: ActionMetadata,
}

/// Owns every action implementation, keyed by lowercase verb.
///
/// Built once at startup and shared read-only afterwards; there is no
/// removal.
#[derive(Default)]
pub struct ActionRegistry {
    verbs: HashMap<String, usize>,
    entries: Vec<Registered>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in actions
    pub fn with_builtins() -> Result<Self, DispatchError> {
        let mut registry = Self::new();
        builtin::register_all(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, action: impl Action + 'static) -> Result<(), DispatchError> {
        self.register_arc(Arc::new(action))
    }

    /// Register an action under every verb it declares. Nothing is
    /// registered when any of its verbs is taken.
    pub fn register_arc(&mut self, action: Arc<dyn Action>) -> Result<(), DispatchError> {
        let metadata = action.metadata();
        for verb in &metadata.verbs {
            if let Some(&index) = self.verbs.get(verb) {
                return Err(DispatchError::DuplicateVerb {
                    verb: verb.clone(),
                    existing: self.entries[index].metadata.name.clone(),
                });
            }
        }

        let index = self.entries.len();
        for verb in &metadata.verbs {
            self.verbs.insert(verb.clone(), index);
        }
        tracing::debug!(action = %metadata.name, verbs = ?metadata.verbs, "Action registered");
        self.entries.push(Registered { action, metadata });
        Ok(())
    }

    fn lookup(&self, verb: &str) -> Option<&Registered> {
        self.verbs
            .get(&verb.to_ascii_lowercase())
            .map(|&index| &self.entries[index])
    }

    pub fn metadata(&self, verb: &str) -> Option<&ActionMetadata> {
        self.lookup(verb).map(|entry| &entry.metadata)
    }

    pub fn role_of(&self, verb: &str) -> Option<ActionRole> {
        self.metadata(verb).map(|meta| meta.role)
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.lookup(verb).is_some()
    }

    /// Metadata of every registered action, in registration order
    pub fn actions(&self) -> impl Iterator<Item = &ActionMetadata> {
        self.entries.iter().map(|entry| &entry.metadata)
    }

    /// Authoritative role catalog for semantic analysis
    pub fn catalog(&self) -> RoleCatalog {
        RoleCatalog::from_metadata(self.actions())
    }

    /// Run the action bound to the statement's verb
    pub async fn dispatch(
        &self,
        stmt: &ActionStmt,
        context: &mut ExecutionContext,
    ) -> Result<Value, DispatchError> {
        let entry = self.lookup(&stmt.verb).ok_or_else(|| DispatchError::UnknownVerb {
            verb: stmt.verb.clone(),
        })?;

        let preposition = stmt.object.preposition;
        if !entry.metadata.prepositions.contains(&preposition) {
            return Err(DispatchError::InvalidPreposition {
                verb: stmt.verb.clone(),
                preposition,
                expected: entry.metadata.prepositions.clone(),
            });
        }

        tracing::trace!(verb = %stmt.verb, action = %entry.metadata.name, "Dispatching action");
        let value = entry
            .action
            .execute(&stmt.result, &stmt.object, context)
            .await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::FnAction;

    fn noop(name: &str, verbs: &[&str]) -> FnAction {
        FnAction::new(
            ActionMetadata::new(name, ActionRole::Own, verbs, &[Preposition::With]),
            |_, _, _| Ok(Value::Null),
        )
    }

    #[test]
    fn test_verbs_are_case_insensitive() {
        let mut registry = ActionRegistry::new();
        registry.register(noop("Greet", &["greet", "Hail"])).unwrap();

        assert!(registry.contains("GREET"));
        assert!(registry.contains("hail"));
        assert_eq!(registry.role_of("Greet"), Some(ActionRole::Own));
        assert!(registry.metadata("wave").is_none());
    }

    #[test]
    fn test_duplicate_verb_registers_nothing() {
        let mut registry = ActionRegistry::new();
        registry.register(noop("Greet", &["greet"])).unwrap();

        let err = registry
            .register(noop("Wave", &["wave", "greet"]))
            .unwrap_err();
        match err {
            DispatchError::DuplicateVerb { verb, existing } => {
                assert_eq!(verb, "greet");
                assert_eq!(existing, "Greet");
            }
            other => panic!("expected duplicate verb, got {:?}", other),
        }
        assert!(!registry.contains("wave"));
        assert_eq!(registry.actions().count(), 1);
    }

    #[test]
    fn test_builtins_cover_core_verbs() {
        let registry = ActionRegistry::with_builtins().unwrap();
        for verb in [
            "create", "compute", "filter", "reduce", "sort", "extract", "retrieve", "store",
            "emit", "log", "return", "throw", "keepalive",
        ] {
            assert!(registry.contains(verb), "missing builtin verb {}", verb);
        }
        assert_eq!(registry.role_of("store"), Some(ActionRole::Export));
        assert_eq!(registry.role_of("return"), Some(ActionRole::Response));

        let catalog = registry.catalog();
        assert!(catalog.is_authoritative());
        assert_eq!(catalog.role_of("fetch"), Some(ActionRole::Request));
    }

    #[test]
    fn test_builtin_verb_clash_is_an_error() {
        let mut registry = ActionRegistry::new();
        registry.register(noop("Make", &["create"])).unwrap();

        let err = builtin::register_all(&mut registry).unwrap_err();
        match err {
            DispatchError::DuplicateVerb { verb, existing } => {
                assert_eq!(verb, "create");
                assert_eq!(existing, "Make");
            }
            other => panic!("expected duplicate verb, got {:?}", other),
        }
        assert!(!registry.contains("compute"));
    }

    #[test]
    fn test_invalid_preposition_message() {
        let err = DispatchError::InvalidPreposition {
            verb: "Store".to_string(),
            preposition: Preposition::From,
            expected: vec![Preposition::Into, Preposition::To],
        };
        assert_eq!(
            err.to_string(),
            "<Store> does not accept 'from' (expected one of: into, to)"
        );
    }
}
