//! Rule: Unreachable Code
//!
//! `Return` and `Throw` end the feature set, so anything after them in the
//! same block never runs.

use crate::executor::types::ast::{Program, Stmt};

use super::super::analyzer::nested_bodies;
use super::super::{Analysis, ValidationError, ValidationRule};

pub struct UnreachableCodeRule;

impl ValidationRule for UnreachableCodeRule {
    fn id(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "Statements after Return or Throw never execute"
    }

    fn validate(&self, program: &Program, _analysis: &Analysis) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for fs in &program.feature_sets {
            let before = errors.len();
            check_block(&fs.body, &mut errors, self.id());
            for err in &mut errors[before..] {
                err.origin = fs.origin.clone();
            }
        }
        errors
    }
}

fn check_block(stmts: &[Stmt], errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    let mut terminated_by: Option<&str> = None;
    for stmt in stmts {
        if let Some(verb) = terminated_by {
            errors.push(ValidationError::warning(
                stmt.span(),
                format!("Unreachable statement after <{}>", verb),
                rule_id,
            ));
            // One report per block
            break;
        }
        for body in nested_bodies(stmt) {
            check_block(body, errors, rule_id);
        }
        if stmt.is_terminator() {
            if let Stmt::Action(action) = stmt {
                terminated_by = Some(action.verb.as_str());
            }
        }
    }
}
