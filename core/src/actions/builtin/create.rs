use async_trait::async_trait;

use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::executor::context::ExecutionContext;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, Value};

/// `<Create> the <user> with { name: "Ada" }.`
///
/// A trailing `with` object is merged into an object-valued source.
pub struct Create;

#[async_trait]
impl Action for Create {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Create",
            ActionRole::Own,
            &["create", "set", "make", "build"],
            &[Preposition::With, Preposition::From, Preposition::For, Preposition::To],
        )
    }

    async fn execute(
        &self,
        _result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let value = context.resolve_object(object)?;
        let Some(argument) = &object.argument else {
            return Ok(value);
        };
        match (value, context.evaluate(argument)?) {
            (Value::Obj(mut fields), Value::Obj(extra)) => {
                fields.extend(extra);
                Ok(Value::Obj(fields))
            }
            (Value::Null, extra) => Ok(extra),
            (base, extra) => Err(ActionError::InvalidInput(format!(
                "cannot merge a {} into a {}",
                extra.type_name(),
                base.type_name()
            ))),
        }
    }
}
