//! Rule: Questionable Flow
//!
//! - warning: an export-role statement hands on data that was never defined
//! - hint: a request/own-role result that nothing reads

use std::collections::HashSet;

use crate::actions::ActionRole;
use crate::executor::types::ast::Program;

use super::super::analyzer::all_inputs;
use super::super::{Analysis, ValidationError, ValidationRule};

pub struct QuestionableFlowRule;

impl ValidationRule for QuestionableFlowRule {
    fn id(&self) -> &'static str {
        "questionable-flow"
    }

    fn description(&self) -> &'static str {
        "Exports need defined inputs and computed results should be used"
    }

    fn validate(&self, _program: &Program, analysis: &Analysis) -> Vec<ValidationError> {
        let read_anywhere = all_inputs(analysis);
        let mut errors = Vec::new();

        for fs in &analysis.feature_sets {
            let undefined: HashSet<&str> =
                fs.unresolved.iter().map(|r| r.name.as_str()).collect();

            for flow in &fs.flows {
                let verb = flow.verb.as_deref().unwrap_or_default();
                match flow.role {
                    Some(ActionRole::Export) => {
                        for input in flow.inputs.iter().filter(|i| undefined.contains(i.as_str())) {
                            errors.push(
                                ValidationError::warning(
                                    flow.span,
                                    format!("<{}> exports '{}', which is never defined", verb, input),
                                    self.id(),
                                )
                                .in_file(fs.origin.as_ref()),
                            );
                        }
                    }
                    Some(ActionRole::Request | ActionRole::Own) if flow.kind == "action" => {
                        for output in flow.outputs.iter().filter(|o| !read_anywhere.contains(o.as_str())) {
                            errors.push(
                                ValidationError::hint(
                                    flow.span,
                                    format!("Result '{}' of <{}> is never used", output, verb),
                                    self.id(),
                                )
                                .in_file(fs.origin.as_ref()),
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
        errors
    }
}
