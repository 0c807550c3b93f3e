//! State transition engine
//!
//! Each state field (e.g. `status`) owns a table of allowed
//! `(from, to)` pairs. Applying a transition validates the pair, writes the
//! new state onto a copy of the entity and emits exactly one transition
//! event. A rejected transition leaves the entity untouched.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use super::{EventKind, RuntimeEvent};
use crate::executor::types::Value;

/// Receives events produced while running a statement
pub trait EventSink {
    fn emit(&mut self, event: RuntimeEvent);
}

impl EventSink for Vec<RuntimeEvent> {
    fn emit(&mut self, event: RuntimeEvent) {
        self.push(event);
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransitionError {
    #[error("no state machine is defined for field '{field}'")]
    UnknownField { field: String },

    #[error("'{object}' is not an object")]
    NotAnObject { object: String },

    #[error("'{object}' has no state field '{field}'")]
    MissingState { object: String, field: String },

    #[error("'{object}' is in state '{actual}', expected '{expected}'")]
    StateMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    #[error("transition '{from}' -> '{to}' is not allowed for field '{field}'")]
    NotAllowed {
        field: String,
        from: String,
        to: String,
    },

    #[error("invalid transition rule '{0}', expected 'from -> to'")]
    InvalidRule(String),
}

/// Allowed `(from, to)` pairs for one state field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    allowed: BTreeSet<(String, String)>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, from: &str, to: &str) -> Self {
        self.allowed.insert((from.to_string(), to.to_string()));
        self
    }

    /// Parse rules written as `"draft -> placed"`
    pub fn parse<S: AsRef<str>>(rules: &[S]) -> Result<Self, TransitionError> {
        let mut table = Self::new();
        for rule in rules {
            let rule = rule.as_ref();
            let (from, to) = rule
                .split_once("->")
                .map(|(f, t)| (f.trim(), t.trim()))
                .filter(|(f, t)| !f.is_empty() && !t.is_empty())
                .ok_or_else(|| TransitionError::InvalidRule(rule.to_string()))?;
            table = table.allow(from, to);
        }
        Ok(table)
    }

    pub fn is_allowed(&self, from: &str, to: &str) -> bool {
        self.allowed.contains(&(from.to_string(), to.to_string()))
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// A state change to apply to an entity held in a variable
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub field: String,
    /// Name of the variable holding the entity, reported in the event
    pub object_name: String,
    pub entity: Value,
    /// State the entity must currently be in, when given
    pub expected_from: Option<String>,
    pub to: String,
}

/// What a successful transition did
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub field: String,
    pub object_name: String,
    pub from_state: String,
    pub to_state: String,
    pub entity_id: Option<Value>,
    pub entity: Value,
}

impl TransitionRecord {
    pub fn to_event(&self) -> RuntimeEvent {
        let mut event = RuntimeEvent::new(EventKind::Transition, self.field.clone())
            .with("field", Value::Str(self.field.clone()))
            .with("objectName", Value::Str(self.object_name.clone()))
            .with("fromState", Value::Str(self.from_state.clone()))
            .with("toState", Value::Str(self.to_state.clone()))
            .with("entity", self.entity.clone());
        if let Some(id) = &self.entity_id {
            event = event.with("entityId", id.clone());
        }
        event
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateTransitionEngine {
    tables: HashMap<String, TransitionTable>,
}

impl StateTransitionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, field: impl Into<String>, table: TransitionTable) -> Self {
        self.define(field, table);
        self
    }

    /// Add (or extend) the table for a field
    pub fn define(&mut self, field: impl Into<String>, table: TransitionTable) {
        let entry = self.tables.entry(field.into()).or_default();
        entry.allowed.extend(table.allowed);
    }

    pub fn table(&self, field: &str) -> Option<&TransitionTable> {
        self.tables.get(field)
    }

    /// Validate and apply a transition, emitting one event into `sink`.
    /// Returns the updated entity.
    pub fn apply(
        &self,
        request: TransitionRequest,
        sink: &mut dyn EventSink,
    ) -> Result<Value, TransitionError> {
        let table = self
            .tables
            .get(&request.field)
            .ok_or_else(|| TransitionError::UnknownField {
                field: request.field.clone(),
            })?;

        let mut fields = match request.entity {
            Value::Obj(fields) => fields,
            _ => {
                return Err(TransitionError::NotAnObject {
                    object: request.object_name,
                })
            }
        };

        let current = fields
            .get(&request.field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| TransitionError::MissingState {
                object: request.object_name.clone(),
                field: request.field.clone(),
            })?;

        if let Some(expected) = &request.expected_from {
            if expected != &current {
                return Err(TransitionError::StateMismatch {
                    object: request.object_name,
                    expected: expected.clone(),
                    actual: current,
                });
            }
        }

        if !table.is_allowed(&current, &request.to) {
            return Err(TransitionError::NotAllowed {
                field: request.field,
                from: current,
                to: request.to,
            });
        }

        fields.insert(request.field.clone(), Value::Str(request.to.clone()));
        let entity = Value::Obj(fields);
        let record = TransitionRecord {
            entity_id: entity.get("id").cloned(),
            field: request.field,
            object_name: request.object_name,
            from_state: current,
            to_state: request.to,
            entity: entity.clone(),
        };
        tracing::debug!(
            field = %record.field,
            object = %record.object_name,
            from = %record.from_state,
            to = %record.to_state,
            "State transition applied"
        );
        sink.emit(record.to_event());
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> StateTransitionEngine {
        StateTransitionEngine::new().with_table(
            "status",
            TransitionTable::parse(&["draft -> placed", "placed -> paid"]).unwrap(),
        )
    }

    fn order(status: &str) -> Value {
        Value::object([("id", Value::from(7i64)), ("status", Value::from(status))])
    }

    fn request(entity: Value, to: &str) -> TransitionRequest {
        TransitionRequest {
            field: "status".into(),
            object_name: "order".into(),
            entity,
            expected_from: None,
            to: to.into(),
        }
    }

    #[test]
    fn test_allowed_transition_updates_entity_and_emits_once() {
        let mut events: Vec<RuntimeEvent> = Vec::new();
        let updated = engine().apply(request(order("draft"), "placed"), &mut events).unwrap();

        assert_eq!(updated.get("status"), Some(&Value::from("placed")));
        assert_eq!(events.len(), 1);
        let payload = &events[0].payload;
        assert_eq!(payload.get("fromState"), Some(&Value::from("draft")));
        assert_eq!(payload.get("toState"), Some(&Value::from("placed")));
        assert_eq!(payload.get("objectName"), Some(&Value::from("order")));
        assert_eq!(payload.get("entityId"), Some(&Value::from(7i64)));
    }

    #[test]
    fn test_disallowed_transition_is_rejected_without_event() {
        let mut events: Vec<RuntimeEvent> = Vec::new();
        let err = engine()
            .apply(request(order("draft"), "paid"), &mut events)
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotAllowed { .. }));
        assert!(events.is_empty());
    }

    #[test]
    fn test_expected_state_mismatch() {
        let mut events: Vec<RuntimeEvent> = Vec::new();
        let mut req = request(order("placed"), "paid");
        req.expected_from = Some("draft".into());
        let err = engine().apply(req, &mut events).unwrap_err();
        assert!(matches!(err, TransitionError::StateMismatch { .. }));
        assert!(events.is_empty());
    }

    #[test]
    fn test_unknown_field() {
        let mut events: Vec<RuntimeEvent> = Vec::new();
        let mut req = request(order("draft"), "placed");
        req.field = "payment".into();
        assert!(matches!(
            engine().apply(req, &mut events),
            Err(TransitionError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_malformed_rule() {
        assert!(TransitionTable::parse(&["draft placed"]).is_err());
    }
}
