//! Per-invocation execution context
//!
//! One context exists for each feature-set invocation. It owns the binding
//! scopes, the pending response and the queue of events raised while the
//! feature set runs. Actions perform every side effect through it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::expressions::{evaluate, evaluate_condition, Bindings, EvalError};
use super::types::ast::{Expr, ObjectDescriptor, SourceKind};
use super::types::Value;
use crate::events::{EventSink, RuntimeEvent};
use crate::services::Services;

/// Response set by `<Return>`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Result name of the return statement, e.g. `OK` or `Created`
    pub status: String,
    pub value: Value,
}

pub struct ExecutionContext {
    services: Arc<Services>,
    feature_set: String,
    activity: String,
    invocation_id: Uuid,
    /// Innermost scope last; the root scope is never popped
    scopes: Vec<HashMap<String, Value>>,
    outbox: Vec<RuntimeEvent>,
    response: Option<Response>,
}

impl ExecutionContext {
    pub fn new(services: Arc<Services>, feature_set: &str, activity: &str) -> Self {
        let invocation_id = Uuid::new_v4();
        let mut root = HashMap::new();
        root.insert(
            "context".to_string(),
            Value::object([
                ("featureSet", Value::from(feature_set)),
                ("activity", Value::from(activity)),
                ("invocationId", Value::Str(invocation_id.to_string())),
            ]),
        );
        Self {
            services,
            feature_set: feature_set.to_string(),
            activity: activity.to_string(),
            invocation_id,
            scopes: vec![root],
            outbox: Vec::new(),
            response: None,
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn feature_set(&self) -> &str {
        &self.feature_set
    }

    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /* ===================== Bindings ===================== */

    /// Bind in the innermost scope, shadowing outer bindings
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Overwrite the nearest existing binding, or bind in the innermost scope
    pub fn assign(&mut self, name: &str, value: Value) {
        match self.scopes.iter_mut().rev().find(|s| s.contains_key(name)) {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => self.bind(name, value),
        }
    }

    /// Local scopes first, then published aliases
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .or_else(|| self.services.globals.get(name))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bindings of the feature set's root scope
    pub fn root_bindings(&self) -> BTreeMap<String, Value> {
        self.scopes
            .first()
            .map(|root| root.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Private copy for one parallel iteration. All visible bindings are
    /// flattened into its root scope; events and response start empty.
    pub fn fork(&self) -> ExecutionContext {
        let mut flattened = HashMap::new();
        for scope in &self.scopes {
            flattened.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        ExecutionContext {
            services: self.services.clone(),
            feature_set: self.feature_set.clone(),
            activity: self.activity.clone(),
            invocation_id: self.invocation_id,
            scopes: vec![flattened, HashMap::new()],
            outbox: Vec::new(),
            response: None,
        }
    }

    /// Take over the events (and a response, if none is set yet) of a fork
    pub fn absorb(&mut self, fork: ExecutionContext) {
        self.outbox.extend(fork.outbox);
        if self.response.is_none() {
            self.response = fork.response;
        }
    }

    /* ===================== Evaluation ===================== */

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvalError> {
        evaluate(expr, self, None)
    }

    /// Evaluate with bare field names resolving against `element`
    pub fn evaluate_on(&self, expr: &Expr, element: &Value) -> Result<Value, EvalError> {
        evaluate(expr, self, Some(element))
    }

    pub fn condition(&self, expr: &Expr) -> Result<bool, EvalError> {
        evaluate_condition(expr, self, None)
    }

    pub fn condition_on(&self, expr: &Expr, element: &Value) -> Result<bool, EvalError> {
        evaluate_condition(expr, self, Some(element))
    }

    /// Value an object descriptor refers to.
    ///
    /// Literal and expression sources are evaluated; named sources are looked
    /// up and drilled into with the qualifier path. Repositories and
    /// services have no value of their own.
    pub fn resolve_object(&self, object: &ObjectDescriptor) -> Result<Value, EvalError> {
        match object.kind {
            SourceKind::Literal | SourceKind::Expression => match &object.value {
                Some(expr) => self.evaluate(expr),
                None => Ok(Value::Null),
            },
            _ => {
                let root = self
                    .lookup(&object.base)
                    .ok_or_else(|| EvalError::Undefined(object.base.clone()))?;
                let path = object.path();
                root.get_path(&path).cloned().ok_or_else(|| {
                    EvalError::Undefined(format!("{}: {}", object.base, path.join(".")))
                })
            }
        }
    }

    /* ===================== Output ===================== */

    pub fn set_response(&mut self, status: impl Into<String>, value: Value) {
        self.response = Some(Response {
            status: status.into(),
            value,
        });
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    pub fn events(&self) -> &[RuntimeEvent] {
        &self.outbox
    }

    pub fn take_events(&mut self) -> Vec<RuntimeEvent> {
        std::mem::take(&mut self.outbox)
    }
}

impl Bindings for ExecutionContext {
    fn lookup(&self, name: &str) -> Option<Value> {
        ExecutionContext::lookup(self, name)
    }
}

impl EventSink for ExecutionContext {
    fn emit(&mut self, event: RuntimeEvent) {
        tracing::trace!(kind = ?event.kind, name = %event.name, "Event queued");
        self.outbox.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::parser::parse_expression;

    fn context() -> ExecutionContext {
        let services = Arc::new(Services::new(ActionRegistry::new()));
        ExecutionContext::new(services, "Test", "Unit")
    }

    #[test]
    fn test_nested_scopes_shadow_without_mutating() {
        let mut ctx = context();
        ctx.bind("x", Value::from(1i64));
        ctx.push_scope();
        ctx.bind("x", Value::from(2i64));
        assert_eq!(ctx.lookup("x"), Some(Value::from(2i64)));
        ctx.pop_scope();
        assert_eq!(ctx.lookup("x"), Some(Value::from(1i64)));
    }

    #[test]
    fn test_assign_updates_enclosing_binding() {
        let mut ctx = context();
        ctx.bind("order", Value::from("draft"));
        ctx.push_scope();
        ctx.assign("order", Value::from("placed"));
        ctx.pop_scope();
        assert_eq!(ctx.lookup("order"), Some(Value::from("placed")));
    }

    #[test]
    fn test_lookup_falls_back_to_published_aliases() {
        let ctx = context();
        assert!(ctx.lookup("shared").is_none());
        ctx.services()
            .globals
            .publish("shared", Value::from(5i64), "Other");
        assert_eq!(ctx.lookup("shared"), Some(Value::from(5i64)));
        assert!(!ctx.is_bound("shared"));
    }

    #[test]
    fn test_context_parameter_is_bound() {
        let ctx = context();
        let expr = parse_expression("<context: featureSet>").unwrap();
        assert_eq!(ctx.evaluate(&expr), Ok(Value::from("Test")));
    }

    #[test]
    fn test_fork_is_private() {
        let mut ctx = context();
        ctx.bind("total", Value::from(1i64));
        let mut fork = ctx.fork();
        assert_eq!(fork.lookup("total"), Some(Value::from(1i64)));
        fork.bind("total", Value::from(9i64));
        fork.emit(RuntimeEvent::domain("Tick"));

        assert_eq!(ctx.lookup("total"), Some(Value::from(1i64)));
        ctx.absorb(fork);
        assert_eq!(ctx.events().len(), 1);
        assert_eq!(ctx.lookup("total"), Some(Value::from(1i64)));
    }
}
