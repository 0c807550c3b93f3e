//! Built-in actions
//!
//! Pure, in-process verbs: nothing here touches the network or the file
//! system. Repositories live in memory on the shared services object.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Action, ActionError, ActionMetadata, ActionRegistry, DispatchError};
use crate::executor::context::ExecutionContext;
use crate::executor::types::{ObjectDescriptor, ResultDescriptor, SourceKind, Value};

mod collection;
mod compute;
mod create;
mod emit;
mod extract;
mod keepalive;
mod repository;
mod response;


pub use collection::{Filter, Reduce, Sort};
pub use compute::Compute;
pub use create::Create;
pub use emit::Emit;
pub use extract::Extract;
pub use keepalive::Keepalive;
pub use repository::{Retrieve, Store};
pub use response::{Log, Return, Throw};

/// Register every built-in action, stopping at the first verb already taken
pub fn register_all(registry: &mut ActionRegistry) -> Result<(), DispatchError> {
    let builtins: Vec<Arc<dyn Action>> = vec![
        Arc::new(Create),
        Arc::new(Compute),
        Arc::new(Filter),
        Arc::new(Reduce),
        Arc::new(Sort),
        Arc::new(Extract),
        Arc::new(Retrieve),
        Arc::new(Store),
        Arc::new(Emit),
        Arc::new(Log),
        Arc::new(Return),
        Arc::new(Throw),
        Arc::new(Keepalive),
    ];
    for action in builtins {
        registry.register_arc(action)?;
    }
    Ok(())
}

type ActionFn = dyn Fn(&ResultDescriptor, &ObjectDescriptor, &mut ExecutionContext) -> Result<Value, ActionError>
    + Send
    + Sync;

/// Synchronous action backed by a closure, for small extensions and tests
pub struct FnAction {
    metadata: ActionMetadata,
    body: Box<ActionFn>,
}

impl FnAction {
    pub fn new<F>(metadata: ActionMetadata, body: F) -> Self
    where
        F: Fn(&ResultDescriptor, &ObjectDescriptor, &mut ExecutionContext) -> Result<Value, ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            metadata,
            body: Box::new(body),
        }
    }
}

#[async_trait]
impl Action for FnAction {
    fn metadata(&self) -> ActionMetadata {
        self.metadata.clone()
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        (self.body)(result, object, context)
    }
}

/* ===================== Helpers ===================== */

/// Lowercased result qualifier; several actions read it as an operation name
fn operation(result: &ResultDescriptor) -> Option<String> {
    result.qualifier.as_deref().map(str::to_ascii_lowercase)
}

/// The `with` clause if present, otherwise the object itself. Services and
/// repositories have no value and yield null.
fn source_value(object: &ObjectDescriptor, context: &ExecutionContext) -> Result<Value, ActionError> {
    if let Some(argument) = &object.argument {
        return Ok(context.evaluate(argument)?);
    }
    match object.kind {
        SourceKind::Service | SourceKind::Repository => Ok(Value::Null),
        _ => Ok(context.resolve_object(object)?),
    }
}

/// Items of a list value; null counts as an empty list
fn elements(value: Value, name: &str) -> Result<Vec<Value>, ActionError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(ActionError::InvalidInput(format!(
            "'{}' is a {}, not a list",
            name,
            other.type_name()
        ))),
    }
}

/// Strings render as their raw text
fn text(value: Value) -> String {
    match value {
        Value::Str(s) => s,
        other => other.to_string(),
    }
}
