use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use super::{elements, operation};
use crate::executor::context::ExecutionContext;
use crate::executor::expressions::{aggregate, length, AGGREGATES};
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, Value};

/// `<Compute> the <total: sum> from the <amounts>.`
///
/// The result qualifier selects the computation; without one the source
/// value is bound unchanged.
pub struct Compute;

#[async_trait]
impl Action for Compute {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Compute",
            ActionRole::Own,
            &["compute", "calculate", "derive"],
            &[Preposition::From, Preposition::For, Preposition::With],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let input = context.resolve_object(object)?;
        let op = operation(result).unwrap_or_else(|| "identity".to_string());
        match op.as_str() {
            "identity" => Ok(input),
            "length" | "count" => Ok(Value::from(length(&input) as i64)),
            "uppercase" => string(input, &op).map(|s| Value::Str(s.to_uppercase())),
            "lowercase" => string(input, &op).map(|s| Value::Str(s.to_lowercase())),
            "hash" => Ok(Value::Str(sha256_hex(&input))),
            name if AGGREGATES.contains(&name) => {
                Ok(aggregate(name, elements(input, &object.base)?)?)
            }
            other => Err(ActionError::InvalidInput(format!(
                "unknown computation '{}'",
                other
            ))),
        }
    }
}

fn string(value: Value, op: &str) -> Result<String, ActionError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ActionError::InvalidInput(format!(
            "{} needs a string, found a {}",
            op,
            other.type_name()
        ))),
    }
}

fn sha256_hex(value: &Value) -> String {
    let digest = match value {
        Value::Str(s) => Sha256::digest(s.as_bytes()),
        other => Sha256::digest(other.to_string().as_bytes()),
    };
    hex::encode(digest)
}
