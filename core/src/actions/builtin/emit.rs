use async_trait::async_trait;

use super::source_value;
use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::events::{EventSink, RuntimeEvent};
use crate::executor::context::ExecutionContext;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, Value};

/// `<Emit> a <UserCreated: event> with <user>.`
///
/// Queues a domain event named after the result. Object values become the
/// payload; anything else is stored under the object's name.
pub struct Emit;

#[async_trait]
impl Action for Emit {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Emit",
            ActionRole::Export,
            &["emit", "notify"],
            &[Preposition::With, Preposition::To, Preposition::For],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let value = source_value(object, context)?;
        let event = RuntimeEvent::domain(result.base.clone());
        let event = match value {
            Value::Obj(fields) => event.with_payload(fields),
            Value::Null => event,
            other => {
                let key = if object.base.is_empty() {
                    "value"
                } else {
                    object.base.as_str()
                };
                event.with(key, other)
            }
        };
        let payload = event.payload_value();
        context.emit(event);
        Ok(payload)
    }
}
