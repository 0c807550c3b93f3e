//! Collection actions: filter, reduce and sort
//!
//! Bare field names in `where` and `with` clauses resolve against the
//! current element first, then against the feature set's bindings.

use std::cmp::Ordering;

use async_trait::async_trait;

use super::{elements, operation};
use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::executor::context::ExecutionContext;
use crate::executor::expressions::aggregate;
use crate::executor::types::{Expr, ObjectDescriptor, Preposition, ResultDescriptor, Value};

/// `<Filter> the <active> from the <orders> where status = "active".`
pub struct Filter;

#[async_trait]
impl Action for Filter {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Filter",
            ActionRole::Own,
            &["filter", "select"],
            &[Preposition::From, Preposition::In],
        )
    }

    async fn execute(
        &self,
        _result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let items = elements(context.resolve_object(object)?, &object.base)?;
        let Some(condition) = &object.condition else {
            return Ok(Value::List(items));
        };
        let mut kept = Vec::new();
        for item in items {
            if context.condition_on(condition, &item)? {
                kept.push(item);
            }
        }
        Ok(Value::List(kept))
    }
}

/// `<Reduce> the <total> from the <active> with sum(amount).`
///
/// Without a `with` call the result qualifier names the aggregate:
/// `<Reduce> the <total: sum> from the <amounts>.`
pub struct Reduce;

#[async_trait]
impl Action for Reduce {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Reduce",
            ActionRole::Own,
            &["reduce", "aggregate"],
            &[Preposition::From, Preposition::With],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let items = elements(context.resolve_object(object)?, &object.base)?;
        let (function, values) = match &object.argument {
            Some(Expr::Call { function, args, .. }) => {
                let values = match args.first() {
                    Some(selector) => items
                        .iter()
                        .map(|item| context.evaluate_on(selector, item))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => items,
                };
                (function.to_ascii_lowercase(), values)
            }
            Some(other) => {
                return Err(ActionError::InvalidInput(format!(
                    "expected an aggregate such as sum(amount), found {}",
                    other
                )))
            }
            None => match operation(result) {
                Some(function) => (function, items),
                None => {
                    return Err(ActionError::InvalidInput(
                        "no aggregate function given".to_string(),
                    ))
                }
            },
        };
        Ok(aggregate(&function, values)?)
    }
}

/// `<Sort> the <ranked: descending> from the <players> with score.`
///
/// Stable; elements without a comparable key keep their relative order.
pub struct Sort;

#[async_trait]
impl Action for Sort {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Sort",
            ActionRole::Own,
            &["sort", "order"],
            &[Preposition::From, Preposition::By, Preposition::With],
        )
    }

    async fn execute(
        &self,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let items = elements(context.resolve_object(object)?, &object.base)?;
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let key = match &object.argument {
                Some(selector) => context.evaluate_on(selector, &item)?,
                None => item.clone(),
            };
            keyed.push((key, item));
        }

        let descending = matches!(operation(result).as_deref(), Some("desc" | "descending"));
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(Value::List(keyed.into_iter().map(|(_, item)| item).collect()))
    }
}
