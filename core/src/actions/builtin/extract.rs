use async_trait::async_trait;

use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::executor::context::ExecutionContext;
use crate::executor::expressions::EvalError;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, Value};

/// `<Extract> the <email> from the <event: user.email>.`
pub struct Extract;

#[async_trait]
impl Action for Extract {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Extract",
            ActionRole::Request,
            &["extract", "get", "parse"],
            &[Preposition::From, Preposition::For, Preposition::In],
        )
    }

    async fn execute(
        &self,
        _result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        match context.resolve_object(object) {
            Ok(value) => Ok(value),
            Err(EvalError::Undefined(name)) => Err(ActionError::NotFound(name)),
            Err(err) => Err(err.into()),
        }
    }
}
