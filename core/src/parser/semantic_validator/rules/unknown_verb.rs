//! Rule: Unknown Verb / Invalid Preposition
//!
//! Only active when the analysis was built from a registry catalog; the
//! fallback role table doesn't know enough to judge.

use crate::executor::types::ast::{Program, Stmt};

use super::super::{visit_stmts, Analysis, ValidationError, ValidationRule};

pub struct UnknownVerbRule;

impl ValidationRule for UnknownVerbRule {
    fn id(&self) -> &'static str {
        "unknown-verb"
    }

    fn description(&self) -> &'static str {
        "Verbs must be registered and used with a supported preposition"
    }

    fn validate(&self, program: &Program, analysis: &Analysis) -> Vec<ValidationError> {
        let catalog = &analysis.catalog;
        if !catalog.is_authoritative() {
            return Vec::new();
        }
        let mut errors = Vec::new();
        for fs in &program.feature_sets {
            visit_stmts(&fs.body, &mut |stmt| {
                let Stmt::Action(action) = stmt else {
                    return;
                };
                let error = match catalog.info(&action.verb) {
                    None => ValidationError::warning(
                        action.span,
                        format!("Unknown action verb <{}>", action.verb),
                        self.id(),
                    ),
                    Some(info)
                        if !info.prepositions.is_empty()
                            && !info.prepositions.contains(&action.object.preposition) =>
                    {
                        let accepted: Vec<&str> =
                            info.prepositions.iter().map(|p| p.as_str()).collect();
                        ValidationError::warning(
                            action.object.span,
                            format!(
                                "<{}> does not accept '{}' (expected one of: {})",
                                action.verb,
                                action.object.preposition.as_str(),
                                accepted.join(", ")
                            ),
                            "invalid-preposition",
                        )
                    }
                    Some(_) => return,
                };
                errors.push(error.in_file(fs.origin.as_ref()));
            });
        }
        errors
    }
}
