//! Execution failures
//!
//! A failing statement is its own error message: the statement is rendered
//! back into prose ("Cannot retrieve the user from the user-repository
//! where id == 42.") with the values it saw substituted in.

use serde::Serialize;
use thiserror::Error;

use super::types::ast::{ActionStmt, Expr, Literal, SourceKind, Span};
use super::types::Value;

/// Why a feature set stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Unknown verb or disallowed preposition
    Dispatch,
    /// An action failed at runtime
    Statement,
    /// `<Throw>` with an author-chosen category
    Thrown { category: String },
    /// A state change outside the transition table
    TransitionRejected,
}

#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct ExecutionError {
    pub kind: FailureKind,
    pub message: String,
    pub span: Span,
    pub feature_set: String,
    /// Underlying cause, when it adds anything to the message
    pub detail: Option<String>,
}

impl ExecutionError {
    pub fn new(kind: FailureKind, message: impl Into<String>, span: Span, feature_set: &str) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            feature_set: feature_set.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn category(&self) -> Option<&str> {
        match &self.kind {
            FailureKind::Thrown { category } => Some(category),
            _ => None,
        }
    }
}

/// `Cannot <verb> the <result> <prep> the <object>[ where <clause>].`
///
/// `resolve` supplies current values for variables in the where clause;
/// scalar values are substituted, everything else is printed by name.
pub fn describe_failure(stmt: &ActionStmt, resolve: &dyn Fn(&str) -> Option<Value>) -> String {
    let object = &stmt.object;
    let target = match (object.kind, &object.value) {
        (SourceKind::Literal | SourceKind::Expression, Some(expr)) => {
            substitute(expr, resolve).to_string()
        }
        _ => match &object.qualifier {
            Some(qualifier) => format!("{} {}", object.base, qualifier),
            None => object.base.clone(),
        },
    };
    let mut message = format!(
        "Cannot {} the {} {} the {}",
        stmt.verb.to_ascii_lowercase(),
        stmt.result.base,
        object.preposition.as_str(),
        target
    );
    if let Some(condition) = &object.condition {
        message.push_str(" where ");
        message.push_str(&substitute(condition, resolve).to_string());
    }
    message.push('.');
    message
}

/// Replace variables holding scalars with their values
fn substitute(expr: &Expr, resolve: &dyn Fn(&str) -> Option<Value>) -> Expr {
    let rec = |e: &Expr| Box::new(substitute(e, resolve));
    match expr {
        Expr::Var { name, path, span } => {
            let value = resolve(name).and_then(|v| v.get_path(path).cloned());
            let literal = match value {
                Some(Value::Null) => Some(Literal::Null),
                Some(Value::Bool(b)) => Some(Literal::Bool(b)),
                Some(Value::Num(n)) => Some(Literal::Num(n)),
                Some(Value::Str(s)) => Some(Literal::Str(s)),
                _ => None,
            };
            match literal {
                Some(v) => Expr::Lit { v, span: *span },
                None => expr.clone(),
            }
        }
        Expr::Unary { op, operand, span } => Expr::Unary {
            op: *op,
            operand: rec(operand),
            span: *span,
        },
        Expr::Binary {
            op,
            left,
            right,
            span,
        } => Expr::Binary {
            op: *op,
            left: rec(left),
            right: rec(right),
            span: *span,
        },
        Expr::List { elements, span } => Expr::List {
            elements: elements.iter().map(|e| substitute(e, resolve)).collect(),
            span: *span,
        },
        Expr::Call {
            function,
            args,
            span,
        } => Expr::Call {
            function: function.clone(),
            args: args.iter().map(|e| substitute(e, resolve)).collect(),
            span: *span,
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::executor::types::ast::Stmt;
    use crate::parser::parse;

    fn first_action(source: &str) -> ActionStmt {
        let program = parse(source).unwrap();
        match program.feature_sets[0].body[0].clone() {
            Stmt::Action(action) => action,
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_message_substitutes_where_values() {
        let stmt = first_action(
            "(Get User: Users) {
                <Retrieve> the <user> from the <user-repository> where id = <user-id>.
            }",
        );
        let values: HashMap<&str, Value> = HashMap::from([("user-id", Value::from(42i64))]);
        let message = describe_failure(&stmt, &|name: &str| values.get(name).cloned());
        assert_eq!(
            message,
            "Cannot retrieve the user from the user-repository where id == 42."
        );
    }

    #[test]
    fn test_message_keeps_unknown_names() {
        let stmt = first_action(
            "(Show: Users) {
                <Extract> the <name> from the <user: profile.name>.
            }",
        );
        let message = describe_failure(&stmt, &|_: &str| None);
        assert_eq!(message, "Cannot extract the name from the user profile.name.");
    }
}
