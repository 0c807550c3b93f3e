//! Repository access
//!
//! Repositories are addressed by object names ending in `-repository`.

use async_trait::async_trait;

use super::operation;
use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::executor::context::ExecutionContext;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, SourceKind, Value};

fn repository_name(object: &ObjectDescriptor) -> Result<&str, ActionError> {
    match object.kind {
        SourceKind::Repository => Ok(&object.base),
        _ => Err(ActionError::InvalidInput(format!(
            "'{}' is not a repository",
            object.base
        ))),
    }
}

/// `<Retrieve> the <user> from the <user-repository> where id = <user-id>.`
///
/// Binds the first match; a `list` or `all` qualifier binds every match.
pub struct Retrieve;

#[async_trait]
impl Action for Retrieve {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Retrieve",
            ActionRole::Request,
            &["retrieve", "fetch", "load"],
            &[Preposition::From],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let repository = repository_name(object)?;
        let stored = context
            .services()
            .repositories
            .retrieve(repository)
            .unwrap_or_default();

        let mut found = Vec::new();
        for item in stored {
            if let Some(condition) = &object.condition {
                if !context.condition_on(condition, &item)? {
                    continue;
                }
            }
            found.push(item);
        }

        if matches!(operation(result).as_deref(), Some("all" | "list")) {
            return Ok(Value::List(found));
        }
        found
            .into_iter()
            .next()
            .ok_or_else(|| ActionError::NotFound(result.base.clone()))
    }
}

/// `<Store> the <user> into the <user-repository>.`
pub struct Store;

#[async_trait]
impl Action for Store {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Store",
            ActionRole::Export,
            &["store", "save", "persist"],
            &[Preposition::Into, Preposition::To, Preposition::In],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let repository = repository_name(object)?;
        let value = context
            .lookup(&result.base)
            .ok_or_else(|| ActionError::NotFound(result.base.clone()))?;
        let size = context
            .services()
            .repositories
            .store(repository, value.clone());
        tracing::debug!(repository, size, "Value stored");
        Ok(value)
    }
}
