//! Runtime events, trigger patterns, the event bus and state transitions

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::types::Value;

pub mod bus;
pub mod state_machine;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use bus::{Dispatch, EventBus, HandlerFailure, HandlerReport};
pub use state_machine::{
    EventSink, StateTransitionEngine, TransitionError, TransitionRecord, TransitionRequest,
    TransitionTable,
};
pub use trigger::TriggerPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Route,
    Domain,
    File,
    Socket,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Start,
    EndSuccess,
    EndError,
}

impl LifecyclePhase {
    pub fn event_name(self) -> &'static str {
        match self {
            LifecyclePhase::Start => "Application-Start",
            LifecyclePhase::EndSuccess => "Application-End: Success",
            LifecyclePhase::EndError => "Application-End: Error",
        }
    }
}

/// Something that happened; routed to every feature set whose trigger
/// pattern matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub id: Uuid,
    pub kind: EventKind,
    /// Lifecycle phase name, operation id, domain event type, or state field
    pub name: String,
    pub payload: BTreeMap<String, Value>,
    pub emitted_at: DateTime<Utc>,
}

impl RuntimeEvent {
    pub fn new(kind: EventKind, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            payload: BTreeMap::new(),
            emitted_at: Utc::now(),
        }
    }

    pub fn lifecycle(phase: LifecyclePhase) -> Self {
        Self::new(EventKind::Lifecycle, phase.event_name())
    }

    /// Boundary request for the feature set named `operation_id`
    pub fn route(operation_id: impl Into<String>) -> Self {
        Self::new(EventKind::Route, operation_id)
    }

    pub fn domain(name: impl Into<String>) -> Self {
        Self::new(EventKind::Domain, name)
    }

    pub fn file(change: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(EventKind::File, change).with("path", Value::Str(path.into()))
    }

    pub fn socket(name: impl Into<String>) -> Self {
        Self::new(EventKind::Socket, name)
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn with_payload(mut self, payload: BTreeMap<String, Value>) -> Self {
        self.payload.extend(payload);
        self
    }

    /// Payload as an object value, bound to `<event>` in handlers
    pub fn payload_value(&self) -> Value {
        Value::Obj(self.payload.clone())
    }
}
