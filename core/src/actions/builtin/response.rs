//! Response-role actions: return, throw and log

use async_trait::async_trait;

use super::{source_value, text};
use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::executor::context::ExecutionContext;
use crate::executor::expressions::EvalError;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, SourceKind, Value};

/// `<Return> an <OK: status> with <user>.`
///
/// Sets the feature set's response; the result name is the status.
pub struct Return;

#[async_trait]
impl Action for Return {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Return",
            ActionRole::Response,
            &["return", "respond"],
            &[Preposition::With, Preposition::For, Preposition::From],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let value = match source_value(object, context) {
            Ok(value) => value,
            // a missing request or event is an empty response, not a failure
            Err(ActionError::Evaluation(EvalError::Undefined(_)))
                if matches!(object.kind, SourceKind::Request | SourceKind::Event) =>
            {
                Value::Null
            }
            Err(err) => return Err(err),
        };
        context.set_response(result.base.clone(), value.clone());
        Ok(value)
    }
}

/// `<Throw> a <NotFound: error> for the <user>.`
///
/// The result name is the error category.
pub struct Throw;

#[async_trait]
impl Action for Throw {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Throw",
            ActionRole::Response,
            &["throw", "fail"],
            &[Preposition::For, Preposition::With],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let message = match &object.argument {
            Some(argument) => text(context.evaluate(argument)?),
            None => match object.kind {
                SourceKind::Literal | SourceKind::Expression => {
                    text(context.resolve_object(object)?)
                }
                _ => match context.lookup(&object.base) {
                    Some(Value::Str(message)) => message,
                    _ => object.base.clone(),
                },
            },
        };
        Err(ActionError::Thrown {
            category: result.base.clone(),
            message,
        })
    }
}

/// `<Log> the <greeting> to the <console>.`
///
/// Logs the `with` clause if present, then a non-service object, then the
/// result binding itself.
pub struct Log;

#[async_trait]
impl Action for Log {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Log",
            ActionRole::Response,
            &["log", "print"],
            &[Preposition::To, Preposition::For, Preposition::With],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let value = match (&object.argument, object.kind) {
            (None, SourceKind::Service | SourceKind::Repository) => context
                .lookup(&result.base)
                .unwrap_or_else(|| Value::Str(result.base.clone())),
            _ => source_value(object, context)?,
        };
        let message = text(value);
        tracing::info!(feature_set = context.feature_set(), "{}", message);
        Ok(Value::Str(message))
    }
}
